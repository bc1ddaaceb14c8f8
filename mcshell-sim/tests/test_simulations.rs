#[cfg(test)]
mod simulation_tests {
    use mcshell_dos::WangLandauOP;
    use mcshell_ff::{ForceFieldManager, NonbondedFF};
    use mcshell_moves::{FlipSpinMove, MoveManager, TranslateMove};
    use mcshell_sim::{
        DlmFileObserver, DosSimulation, MultiWalkerDos, Observer, ObserverFlags, SimState,
        StandardSimulation,
    };
    use mcshell_statistics::Histogram;
    use mcshell_system::{species_id, ParticlePrototype, World, WorldManager};
    use nalgebra::Vector3;
    use std::sync::atomic::Ordering;

    /// Simple cubic Ising-like lattice of side `l` with alternating spins.
    fn ising_world(l: usize, temperature: f64, seed: u64) -> (World, ForceFieldManager, u32) {
        let s = species_id("simtest-spin");
        let mut w = World::new([l as f64, l as f64, l as f64], 1.1, 0.0, seed).unwrap();
        w.set_temperature(temperature);
        w.fill_lattice(&[ParticlePrototype::site(s)], &[1.0]);

        // Checkerboard start: half up, half down.
        let roots = w.particles().to_vec();
        for (i, &p) in roots.iter().enumerate() {
            let up = (i + i / l + i / (l * l)) % 2 == 0;
            let z = if up { 1.0 } else { -1.0 };
            w.set_director(p, Vector3::new(0.0, 0.0, z));
        }
        w.update_neighbor_list();

        let mut ffm = ForceFieldManager::new();
        ffm.add_nonbonded_by_id(s, s, NonbondedFF::IsingSpin { j: 1.0 });
        (w, ffm, s)
    }

    fn magnetization(w: &World) -> f64 {
        let sum: f64 = w.particles().iter().map(|&p| w.particle(p).director().z).sum();
        sum / w.particle_count() as f64
    }

    #[test]
    fn cold_ising_lattice_orders_under_flip_spin() {
        let (w, ffm, _) = ising_world(6, 1.0, 42);
        let n = w.particle_count();
        let mut wm = WorldManager::new(42);
        wm.add_world(w);

        let mut moves = MoveManager::new(43);
        moves.add_move(Box::new(FlipSpinMove::new(44)), 1);

        let mut sim = StandardSimulation::new(wm, ffm, moves);
        let e0 = sim.worlds().world(0).energy().total() / n as f64;
        sim.run(60);

        let w = sim.worlds().world(0);
        let e_per_site = w.energy().total() / n as f64;
        let m = magnetization(w);
        assert!(e_per_site < e0, "energy did not decrease: {} -> {}", e0, e_per_site);
        // Six nearest neighbors, each bond counted once.
        assert!(e_per_site >= -3.0 - 1e-9);
        assert!(m.abs() <= 1.0 + 1e-12);
        assert!(m.is_finite());

        // Accumulated energy still matches a full evaluation.
        let fresh = sim.forcefields().evaluate_world(w).energy.total();
        assert!((w.energy().total() - fresh).abs() < 1e-8);
    }

    #[test]
    fn stop_flag_cancels_between_iterations() {
        let (w, ffm, _) = ising_world(4, 1.0, 7);
        let mut wm = WorldManager::new(7);
        wm.add_world(w);
        let mut moves = MoveManager::new(8);
        moves.add_move(Box::new(FlipSpinMove::new(9)), 1);

        let mut sim = StandardSimulation::new(wm, ffm, moves);
        sim.stop_handle().store(true, Ordering::Relaxed);
        sim.run(100);
        assert_eq!(sim.iteration(), 0);
    }

    struct CountingObserver {
        calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
    }

    impl Observer for CountingObserver {
        fn observe(&mut self, _state: &SimState) {
            self.calls.fetch_add(1, Ordering::Relaxed);
        }
        fn flush(&mut self) {}
        fn name(&self) -> &str {
            "Counting"
        }
    }

    #[test]
    fn observers_fire_at_their_lag_times() {
        let (w, ffm, _) = ising_world(4, 1.0, 17);
        let mut wm = WorldManager::new(17);
        wm.add_world(w);
        let mut moves = MoveManager::new(18);
        moves.add_move(Box::new(FlipSpinMove::new(19)), 1);

        let calls = std::sync::Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let mut sim = StandardSimulation::new(wm, ffm, moves);
        sim.add_observer(Box::new(CountingObserver { calls: calls.clone() }), 2);
        sim.run(10);
        assert_eq!(calls.load(Ordering::Relaxed), 5);
    }

    #[test]
    fn dlm_observer_writes_column_files() {
        let (w, ffm, _) = ising_world(4, 1.0, 27);
        let mut wm = WorldManager::new(27);
        wm.add_world(w);
        let mut moves = MoveManager::new(28);
        moves.add_move(Box::new(FlipSpinMove::new(29)), 1);

        let prefix = std::env::temp_dir().join(format!("mcshell-obs-{}", std::process::id()));
        let prefix = prefix.to_str().unwrap().to_string();
        let mut sim = StandardSimulation::new(wm, ffm, moves);
        sim.add_observer(
            Box::new(DlmFileObserver::new(&prefix, ObserverFlags::default())),
            1,
        );
        sim.run(3);

        let path = format!("{}.world0.dat", prefix);
        let contents = std::fs::read_to_string(&path).unwrap();
        // Header plus one row per iteration.
        assert_eq!(contents.lines().count(), 4);
        assert!(contents.lines().next().unwrap().contains("e_total"));
        let _ = std::fs::remove_file(&path);
    }

    fn spin_dos_walker(seed: u64) -> DosSimulation {
        let (w, ffm, _) = ising_world(4, 1.0, seed);
        let n = w.particle_count() as f64;
        let mut moves = MoveManager::new(seed ^ 0xd05);
        moves.add_move(Box::new(FlipSpinMove::new(seed ^ 0xf11)), 1);

        // Sample the low-energy window of the [-3N, 3N] spectrum; the
        // out-of-range rule drives the walker back when it strays.
        let hist = Histogram::new(-3.3 * n, 0.6 * n, 8);
        let op = Box::new(WangLandauOP::new(hist));
        let mut sim = DosSimulation::new(w, ffm, moves, op);
        sim.set_target_flatness(0.2);
        sim
    }

    #[test]
    fn wang_landau_reduces_its_convergence_factor() {
        let mut sim = spin_dos_walker(100);
        sim.run(2);
        assert!((sim.convergence_factor() - 0.25).abs() < 1e-12);
        assert!(sim.iteration() > 0);
        // The log-DOS estimate accumulated somewhere.
        let values = sim.order_parameter().histogram().values();
        assert!(values.iter().any(|&v| v > 0.0));
        // Counts were reset after the last reduction.
        assert!(sim.order_parameter().histogram().counts().iter().all(|&c| c == 0));
    }

    #[test]
    fn dos_flatness_is_reached_inside_each_sweep() {
        let mut sim = spin_dos_walker(200);
        sim.set_target_flatness(0.3);
        // One reduction: the sweep must have ended at or above the target.
        sim.run(1);
        assert!(sim.flatness() >= 0.3);
    }

    #[test]
    fn multi_walker_dos_synchronizes_and_finishes() {
        let walkers = vec![spin_dos_walker(300), spin_dos_walker(301)];
        let mut multi = MultiWalkerDos::new(walkers, 5);
        multi.run(1);

        for walker in multi.walkers() {
            assert!(walker.iteration() > 0);
            let values = walker.order_parameter().histogram().values();
            assert!(values.iter().any(|&v| v != 0.0));
        }
    }

    #[test]
    fn translate_driver_samples_a_fluid() {
        let s = species_id("simtest-lj");
        let mut w = World::new([7.0, 7.0, 7.0], 2.0, 0.3, 55).unwrap();
        w.set_temperature(1.5);
        // Packing at this density leaves the box comfortably wider than
        // twice the neighbor radius.
        w.pack_world(&[ParticlePrototype::site(s)], &[1.0], 50, 0.4);
        w.update_neighbor_list();
        let mut ffm = ForceFieldManager::new();
        ffm.add_nonbonded_by_id(
            s,
            s,
            NonbondedFF::LennardJones { epsilon: 1.0, sigma: 1.0, cutoffs: vec![2.0] },
        );
        let mut wm = WorldManager::new(56);
        wm.add_world(w);
        let mut moves = MoveManager::new(57);
        moves.add_move(Box::new(TranslateMove::new(0.35, 58)), 1);

        let mut sim = StandardSimulation::new(wm, ffm, moves);
        sim.run(30);

        let w = sim.worlds().world(0);
        let fresh = sim.forcefields().evaluate_world(w).energy.total();
        let scale = fresh.abs().max(1.0);
        assert!(((w.energy().total() - fresh) / scale).abs() < 1e-9);
        let accepted = sim.acceptance_map()[0].1;
        assert!(accepted > 0.0 && accepted <= 1.0);
    }
}
