#[cfg(test)]
mod particle_tests {
    use mcshell_numerical::assert_eq_float;
    use mcshell_numerical::assert_eq_vec3;
    use mcshell_system::{species_id, ParticlePrototype, World};
    use nalgebra::Vector3;

    fn dimer_prototype() -> ParticlePrototype {
        let head = species_id("ptest-head");
        let tail = species_id("ptest-tail");
        let molecule = species_id("ptest-dimer");
        ParticlePrototype::molecule(
            molecule,
            vec![
                ParticlePrototype::site(head)
                    .with_position(Vector3::new(-0.5, 0.0, 0.0))
                    .with_charge(1.0)
                    .with_mass(2.0),
                ParticlePrototype::site(tail)
                    .with_position(Vector3::new(0.5, 0.0, 0.0))
                    .with_charge(-1.0)
                    .with_mass(1.0),
            ],
            vec![(0, 1)],
        )
    }

    fn world() -> World {
        World::new([20.0, 20.0, 20.0], 3.0, 1.0, 11).unwrap()
    }

    #[test]
    fn composite_state_is_derived_from_children() {
        let mut w = world();
        let proto = dimer_prototype().with_position(Vector3::new(10.0, 10.0, 10.0));
        let p = w.add_particle(&proto);

        let mol = w.particle(p);
        assert_eq_float!(mol.mass(), 3.0, 1e-14);
        assert_eq_float!(mol.charge(), 0.0, 1e-14);
        // Mass-weighted centroid: (2*(-0.5) + 1*0.5)/3 off the insertion point.
        assert_eq_vec3!(mol.position(), Vector3::new(10.0 - 0.5 / 3.0, 10.0, 10.0), 1e-12);
        assert_eq!(mol.children().len(), 2);

        let head = mol.children()[0];
        let tail = mol.children()[1];
        assert!(w.particle(head).bonded_neighbors().contains(&tail));
        assert!(w.particle(tail).bonded_neighbors().contains(&head));
        assert_eq!(w.particle(head).parent(), Some(p));
    }

    #[test]
    fn moving_a_child_updates_the_centroid() {
        let mut w = world();
        let p = w.add_particle(&dimer_prototype().with_position(Vector3::new(5.0, 5.0, 5.0)));
        let head = w.particle(p).children()[0];
        let tail = w.particle(p).children()[1];

        w.set_position(head, w.particle(head).position() + Vector3::new(0.3, 0.0, 0.0));
        let expected = (w.particle(head).position() * 2.0 + w.particle(tail).position()) / 3.0;
        assert_eq_vec3!(w.particle(p).position(), expected, 1e-12);
    }

    #[test]
    fn composite_translation_is_rigid() {
        let mut w = world();
        let p = w.add_particle(&dimer_prototype().with_position(Vector3::new(5.0, 5.0, 5.0)));
        let head = w.particle(p).children()[0];
        let before = w.particle(head).position() - w.particle(p).position();

        w.set_position(p, Vector3::new(8.0, 9.0, 10.0));
        assert_eq_vec3!(w.particle(p).position(), Vector3::new(8.0, 9.0, 10.0), 1e-12);
        let after = w.particle(head).position() - w.particle(p).position();
        assert_eq_vec3!(before, after, 1e-12);
    }

    #[test]
    fn charging_a_child_propagates_to_the_parent() {
        let mut w = world();
        let p = w.add_particle(&dimer_prototype().with_position(Vector3::new(5.0, 5.0, 5.0)));
        let head = w.particle(p).children()[0];
        w.set_charge(head, 2.5);
        assert_eq_float!(w.particle(p).charge(), 2.5 - 1.0, 1e-14);
    }

    #[test]
    #[should_panic(expected = "composite")]
    fn charging_a_composite_directly_is_fatal() {
        let mut w = world();
        let p = w.add_particle(&dimer_prototype().with_position(Vector3::new(5.0, 5.0, 5.0)));
        w.set_charge(p, 1.0);
    }

    #[test]
    fn extraction_round_trips_through_a_prototype() {
        let mut w = world();
        let p = w.add_particle(&dimer_prototype().with_position(Vector3::new(5.0, 6.0, 7.0)));
        let centroid = w.particle(p).position();
        let head_pos = w.particle(w.particle(p).children()[0]).position();

        let proto = w.extract_particle(p);
        assert_eq!(w.particle_count(), 0);
        assert!(w.composition().is_empty());

        let q = w.add_particle(&proto);
        assert_eq_vec3!(w.particle(q).position(), centroid, 1e-12);
        assert_eq_vec3!(w.particle(w.particle(q).children()[0]).position(), head_pos, 1e-12);
        assert_eq!(w.particle(q).children().len(), 2);
        let h = w.particle(q).children()[0];
        let t = w.particle(q).children()[1];
        assert!(w.particle(h).bonded_neighbors().contains(&t));
    }

    #[test]
    fn species_change_updates_composition() {
        let a = species_id("ptest-s1");
        let b = species_id("ptest-s2");
        let mut w = world();
        let p = w.add_particle(&ParticlePrototype::site(a).with_position(Vector3::new(1.0, 1.0, 1.0)));
        assert_eq!(w.species_count(a), 1);
        w.set_species(p, b);
        assert_eq!(w.species_count(a), 0);
        assert_eq!(w.species_count(b), 1);
        assert!(w.random_particle_by_species(b).is_some());
        assert!(w.random_particle_by_species(a).is_none());
    }

    #[test]
    fn events_carry_old_and_new_values() {
        let s = species_id("ptest-events");
        let mut w = world();
        let p = w.add_particle(&ParticlePrototype::site(s).with_position(Vector3::new(1.0, 1.0, 1.0)));
        w.set_event_recording(true);

        w.set_position(p, Vector3::new(2.0, 1.0, 1.0));
        w.set_director(p, Vector3::new(1.0, 0.0, 0.0));
        let events = w.drain_events();
        assert_eq!(events.len(), 2);
        match events[0].change {
            mcshell_system::ParticleChange::Position { old } => {
                assert_eq_vec3!(old, Vector3::new(1.0, 1.0, 1.0), 1e-14);
            }
            _ => panic!("expected a position event"),
        }
        assert_eq_vec3!(events[1].director, Vector3::new(1.0, 0.0, 0.0), 1e-14);
        assert!(w.drain_events().is_empty());
    }
}
