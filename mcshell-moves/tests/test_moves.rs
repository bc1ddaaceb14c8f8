#[cfg(test)]
mod move_tests {
    use mcshell_ff::{ForceFieldManager, NonbondedFF};
    use mcshell_moves::{
        DeleteParticleMove, DirectorRotateMove, FlipSpinMove, InsertParticleMove, Move,
        MoveManager, MoveOverride, ParticleSwapMove, RotateMove, TranslateMove, VolumeScaleMove,
        VolumeSwapMove, WidomInsertionMove,
    };
    use mcshell_numerical::assert_eq_float;
    use mcshell_system::{species_id, ParticlePrototype, World, WorldManager};
    use nalgebra::Vector3;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn lj(rc: f64) -> NonbondedFF {
        NonbondedFF::LennardJones { epsilon: 1.0, sigma: 1.0, cutoffs: vec![rc] }
    }

    /// A small LJ fluid with its accumulated energy already seeded from a
    /// full evaluation.
    fn lj_fluid(n: usize, seed: u64) -> (WorldManager, ForceFieldManager, u32) {
        let s = species_id("mvtest-lj");
        let mut w = World::new([8.0, 8.0, 8.0], 2.5, 1.0, seed).unwrap();
        w.set_temperature(2.0);
        let mut rng = SmallRng::seed_from_u64(seed ^ 0x5eed);
        for _ in 0..n {
            let pos = Vector3::new(
                rng.gen_range(0.0..8.0),
                rng.gen_range(0.0..8.0),
                rng.gen_range(0.0..8.0),
            );
            w.add_particle(&ParticlePrototype::site(s).with_position(pos));
        }
        w.register_prototype(&ParticlePrototype::site(s), 8);
        w.update_neighbor_list();

        let mut ffm = ForceFieldManager::new();
        ffm.add_nonbonded_by_id(s, s, lj(2.5));
        let ep = ffm.evaluate_world(&w);
        w.set_energy(ep.energy);
        w.set_pressure(ep.pressure);

        let mut wm = WorldManager::new(seed);
        wm.add_world(w);
        (wm, ffm, s)
    }

    fn world_fingerprint(w: &World) -> Vec<(u32, [f64; 3], [f64; 3], f64)> {
        let mut rows: Vec<_> = w
            .particles()
            .iter()
            .map(|&p| {
                let particle = w.particle(p);
                let pos = particle.position();
                let dir = particle.director();
                (
                    particle.species(),
                    [pos.x, pos.y, pos.z],
                    [dir.x, dir.y, dir.z],
                    particle.charge(),
                )
            })
            .collect();
        rows.sort_by(|a, b| a.partial_cmp(b).unwrap());
        rows
    }

    #[test]
    fn force_reject_restores_state_exactly() {
        let (mut wm, ffm, _) = lj_fluid(25, 1);
        let before = world_fingerprint(wm.world(0));
        let e_before = wm.world(0).energy();

        let mut moves: Vec<Box<dyn Move>> = vec![
            Box::new(TranslateMove::new(0.5, 11)),
            Box::new(RotateMove::new(1.0, 12)),
            Box::new(FlipSpinMove::new(13)),
            Box::new(DirectorRotateMove::new(14)),
        ];
        for _ in 0..250 {
            for mv in moves.iter_mut() {
                mv.perform(&mut wm, &ffm, MoveOverride::ForceReject);
                let e = wm.world(0).energy();
                assert_eq_float!(e.total(), e_before.total(), 1e-9);
            }
        }
        let after = world_fingerprint(wm.world(0));
        for (a, b) in before.iter().zip(after.iter()) {
            assert_eq!(a.0, b.0);
            for k in 0..3 {
                assert_eq_float!(a.1[k], b.1[k], 1e-12);
                assert_eq_float!(a.2[k], b.2[k], 1e-12);
            }
        }
    }

    #[test]
    fn accumulated_energy_tracks_full_reevaluation() {
        let (mut wm, ffm, _) = lj_fluid(25, 2);
        let mut translate = TranslateMove::new(0.4, 21);
        for _ in 0..400 {
            translate.perform(&mut wm, &ffm, MoveOverride::None);
            let accumulated = wm.world(0).energy().total();
            let fresh = ffm.evaluate_world(wm.world(0)).energy.total();
            let scale = fresh.abs().max(1.0);
            assert!(
                ((accumulated - fresh) / scale).abs() < 1e-10,
                "accumulated {} drifted from fresh {}",
                accumulated,
                fresh
            );
        }
        assert!(translate.acceptance_ratio() > 0.0);
    }

    #[test]
    fn moves_on_an_empty_world_count_no_attempts() {
        let s = species_id("mvtest-empty");
        let mut w = World::new([8.0, 8.0, 8.0], 2.5, 1.0, 3).unwrap();
        w.set_temperature(1.0);
        let mut wm = WorldManager::new(3);
        wm.add_world(w);
        let ffm = ForceFieldManager::new();

        let mut translate = TranslateMove::new(0.5, 31);
        let mut delete = DeleteParticleMove::new(vec![s], 32);
        translate.perform(&mut wm, &ffm, MoveOverride::None);
        delete.perform(&mut wm, &ffm, MoveOverride::None);
        assert_eq_float!(translate.acceptance_ratio(), 0.0, 1e-15);
        assert_eq_float!(delete.acceptance_ratio(), 0.0, 1e-15);
    }

    #[test]
    fn insertion_into_an_empty_world_always_accepts() {
        let s = species_id("mvtest-gc-ins");
        let mut w = World::new([10.0, 10.0, 10.0], 2.5, 1.0, 4).unwrap();
        w.set_temperature(1.5);
        w.register_prototype(&ParticlePrototype::site(s), 4);
        w.update_neighbor_list();
        let mut ffm = ForceFieldManager::new();
        ffm.add_nonbonded_by_id(s, s, lj(2.5));
        let mut wm = WorldManager::new(4);
        wm.add_world(w);

        // V / (lambda^3 * 1) * exp(beta mu) = 1000 with mu = 0: certain.
        let mut insert = InsertParticleMove::new(vec![s], false, 41);
        insert.perform(&mut wm, &ffm, MoveOverride::None);
        assert_eq!(wm.world(0).particle_count(), 1);
        assert_eq_float!(insert.acceptance_ratio(), 1.0, 1e-15);
    }

    #[test]
    fn deletion_from_a_single_particle_world_is_permitted() {
        let s = species_id("mvtest-gc-del");
        let mut w = World::new([10.0, 10.0, 10.0], 2.5, 1.0, 5).unwrap();
        w.set_temperature(1.5);
        w.add_particle(&ParticlePrototype::site(s).with_position(Vector3::new(5.0, 5.0, 5.0)));
        w.register_prototype(&ParticlePrototype::site(s), 2);
        w.update_neighbor_list();
        let mut wm = WorldManager::new(5);
        wm.add_world(w);
        let ffm = ForceFieldManager::new();

        let mut delete = DeleteParticleMove::new(vec![s], 51);
        delete.perform(&mut wm, &ffm, MoveOverride::ForceAccept);
        assert_eq!(wm.world(0).particle_count(), 0);
        assert_eq!(wm.world(0).species_count(s), 0);
    }

    #[test]
    fn insert_then_force_reject_leaves_composition_unchanged() {
        let (mut wm, ffm, s) = lj_fluid(10, 6);
        let n0 = wm.world(0).particle_count();
        let stash0 = wm.world(0).stash_count(s);

        let mut insert = InsertParticleMove::new(vec![s], false, 61);
        for _ in 0..50 {
            insert.perform(&mut wm, &ffm, MoveOverride::ForceReject);
        }
        assert_eq!(wm.world(0).particle_count(), n0);
        assert_eq!(wm.world(0).stash_count(s), stash0);
        let fresh = ffm.evaluate_world(wm.world(0)).energy.total();
        assert_eq_float!(wm.world(0).energy().total(), fresh, 1e-9);
    }

    #[test]
    fn volume_scale_force_reject_round_trips_positions() {
        let (mut wm, ffm, _) = lj_fluid(20, 7);
        let before = world_fingerprint(wm.world(0));
        let v0 = wm.world(0).volume();

        let mut vol = VolumeScaleMove::new(1.0, 0.3, 71);
        for _ in 0..20 {
            vol.perform(&mut wm, &ffm, MoveOverride::ForceReject);
        }
        assert_eq_float!(wm.world(0).volume(), v0, 1e-9);
        let after = world_fingerprint(wm.world(0));
        for (a, b) in before.iter().zip(after.iter()) {
            for k in 0..3 {
                assert_eq_float!(a.1[k], b.1[k], 1e-11);
            }
        }
    }

    #[test]
    fn volume_swap_conserves_total_volume() {
        let (mut wm1, ffm, _) = lj_fluid(15, 8);
        let (mut wm2, _, _) = lj_fluid(15, 9);
        let w2 = wm2.worlds_mut()[0].clone();
        wm1.add_world(w2);
        let total = wm1.world(0).volume() + wm1.world(1).volume();

        let mut swap = VolumeSwapMove::new(0.2, 81);
        for _ in 0..30 {
            swap.perform(&mut wm1, &ffm, MoveOverride::None);
            assert_eq_float!(wm1.world(0).volume() + wm1.world(1).volume(), total, 1e-8);
        }
    }

    #[test]
    fn particle_swap_conserves_total_count() {
        let (mut wm1, ffm, _) = lj_fluid(12, 10);
        let (mut wm2, _, _) = lj_fluid(8, 11);
        let w2 = wm2.worlds_mut()[0].clone();
        wm1.add_world(w2);
        let total = wm1.world(0).particle_count() + wm1.world(1).particle_count();

        let mut swap = ParticleSwapMove::new(101);
        for _ in 0..60 {
            swap.perform(&mut wm1, &ffm, MoveOverride::None);
            assert_eq!(
                wm1.world(0).particle_count() + wm1.world(1).particle_count(),
                total
            );
        }
    }

    #[test]
    fn widom_insertion_never_changes_the_count() {
        let (mut wm, ffm, s) = lj_fluid(20, 12);
        let n0 = wm.world(0).particle_count();
        let mut widom = WidomInsertionMove::new(vec![s], 121);
        for _ in 0..200 {
            widom.perform(&mut wm, &ffm, MoveOverride::None);
            assert_eq!(wm.world(0).particle_count(), n0);
        }
        // An interacting fluid has a finite excess chemical potential.
        let mu = wm.world(0).chemical_potential(s);
        assert!(mu.is_finite());
        assert!(mu != 0.0);
    }

    #[test]
    fn move_manager_selects_by_weight() {
        let mut mm = MoveManager::new(7);
        mm.add_move(Box::new(TranslateMove::new(0.5, 1)), 3);
        mm.add_move(Box::new(FlipSpinMove::new(2)), 1);

        let mut counts = [0usize; 2];
        for _ in 0..4000 {
            let name = mm.select_random_move().name();
            if name == "Translate" {
                counts[0] += 1;
            } else {
                counts[1] += 1;
            }
        }
        let ratio = counts[0] as f64 / counts[1] as f64;
        assert!(ratio > 2.4 && ratio < 3.6, "weighted ratio off: {}", ratio);
    }
}
