#[cfg(test)]
mod builder_tests {
    use mcshell::{build_engine, BuildError, Config, Engine};
    use serde_json::json;

    fn expect_errors(config: &Config) -> Vec<BuildError> {
        match build_engine(config) {
            Err(errors) => errors,
            Ok(_) => panic!("expected the build to fail"),
        }
    }

    fn lattice_config(l: usize) -> serde_json::Value {
        let mut particles = Vec::new();
        let mut id = 0;
        for x in 0..l {
            for y in 0..l {
                for z in 0..l {
                    particles.push(json!([
                        id,
                        "spin",
                        [x as f64 + 0.5, y as f64 + 0.5, z as f64 + 0.5],
                        [0.0, 0.0, 1.0]
                    ]));
                    id += 1;
                }
            }
        }
        json!({
            "worlds": [{
                "type": "Simple",
                "dimensions": [l as f64, l as f64, l as f64],
                "nlist_cutoff": 1.1,
                "skin_thickness": 0.0,
                "seed": 7,
                "temperature": 2.0,
                "components": [["spin", particles.len()]],
                "particles": particles
            }],
            "forcefields": {
                "nonbonded": [
                    {"type": "LebwohlLasher", "species": ["spin"], "epsilon": 1.0, "gamma": 0.0}
                ]
            },
            "moves": [
                {"type": "DirectorRotate", "weight": 1, "seed": 11}
            ],
            "simulation": {"type": "Standard", "sweeps": 5, "seed": 3}
        })
    }

    #[test]
    fn minimal_standard_config_builds_and_runs() {
        let config: Config = serde_json::from_value(lattice_config(4)).unwrap();
        let mut engine = build_engine(&config).unwrap();
        match &engine {
            Engine::Standard { simulation, sweeps } => {
                assert_eq!(*sweeps, 5);
                assert_eq!(simulation.worlds().world_count(), 1);
                assert_eq!(simulation.worlds().world(0).particle_count(), 64);
            }
            _ => panic!("expected a Standard engine"),
        }
        engine.run();
        match &engine {
            Engine::Standard { simulation, .. } => {
                assert_eq!(simulation.iteration(), 5);
                // The driver seeded the accumulated energy; a lattice of
                // aligned directors starts at -N_bonds.
                let fresh = simulation
                    .forcefields()
                    .evaluate_world(simulation.worlds().world(0))
                    .energy
                    .total();
                let acc = simulation.worlds().world(0).energy().total();
                assert!((acc - fresh).abs() < 1e-8);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn build_errors_are_aggregated() {
        let mut value = lattice_config(3);
        value["forcefields"]["nonbonded"][0]["type"] = json!("NoSuchPotential");
        value["moves"][0]["type"] = json!("NoSuchMove");
        value["observers"] = json!([{"type": "NoSuchObserver", "frequency": 10}]);
        let config: Config = serde_json::from_value(value).unwrap();

        let errors = expect_errors(&config);
        assert!(errors.len() >= 3, "expected at least 3 errors, got {:?}", errors);
        assert!(errors.iter().any(|e| matches!(e, BuildError::UnknownType { path, .. } if path.contains("nonbonded"))));
        assert!(errors.iter().any(|e| matches!(e, BuildError::UnknownType { path, .. } if path.contains("moves"))));
        assert!(errors.iter().any(|e| matches!(e, BuildError::UnknownType { path, .. } if path.contains("observers"))));
    }

    #[test]
    fn bad_geometry_is_a_domain_error() {
        let mut value = lattice_config(3);
        value["worlds"][0]["nlist_cutoff"] = json!(5.0);
        let config: Config = serde_json::from_value(value).unwrap();
        let errors = expect_errors(&config);
        assert!(errors.iter().any(|e| matches!(e, BuildError::Domain { .. })));
    }

    #[test]
    fn unknown_forcefield_species_is_reported() {
        let mut value = lattice_config(3);
        value["forcefields"]["nonbonded"][0]["species"] = json!(["no-such-species"]);
        let config: Config = serde_json::from_value(value).unwrap();
        let errors = expect_errors(&config);
        assert!(errors.iter().any(|e| matches!(e, BuildError::UnknownSpecies { .. })));
    }

    #[test]
    fn dos_histogram_round_trips_values_and_counts() {
        let mut value = lattice_config(3);
        let values: Vec<f64> = (0..10).map(|i| i as f64 * 0.25).collect();
        let counts: Vec<u64> = (0..10).map(|i| i * 3).collect();
        value["moves"] = json!([{"type": "DirectorRotate", "weight": 1, "seed": 11}]);
        value["simulation"] = json!({
            "type": "DOS",
            "sweeps": 0,
            "seed": 3,
            "dos": {
                "interval": [-100.0, 20.0],
                "bin_count": 10,
                "target_flatness": 0.5,
                "values": values,
                "counts": counts,
                "order_parameter": {"type": "WangLandau"}
            }
        });
        let config: Config = serde_json::from_value(value).unwrap();
        let engine = build_engine(&config).unwrap();
        match engine {
            Engine::Dos { simulation, .. } => {
                let hist = simulation.order_parameter().histogram();
                assert_eq!(hist.bin_count(), 10);
                assert_eq!(hist.values(), values.as_slice());
                assert_eq!(hist.counts(), counts.as_slice());
                assert_eq!(hist.min(), -100.0);
                assert_eq!(hist.max(), 20.0);
            }
            _ => panic!("expected a DOS engine"),
        }
    }

    #[test]
    fn histogram_spec_must_pick_count_or_width() {
        let mut value = lattice_config(3);
        value["simulation"] = json!({
            "type": "DOS",
            "sweeps": 0,
            "seed": 3,
            "dos": {
                "interval": [-100.0, 20.0],
                "bin_count": 10,
                "bin_width": 1.0,
                "order_parameter": {"type": "WangLandau"}
            }
        });
        let config: Config = serde_json::from_value(value).unwrap();
        let errors = expect_errors(&config);
        assert!(errors
            .iter()
            .any(|e| matches!(e, BuildError::BadValue { message, .. } if message.contains("bin_count"))));
    }

    #[test]
    fn molecule_blueprints_consume_site_rows() {
        let value = json!({
            "blueprints": {
                "dimer": {
                    "children": [
                        {"species": "head", "charge": 1.0, "mass": 2.0},
                        {"species": "tail", "charge": -1.0, "mass": 1.0}
                    ],
                    "bonds": [[0, 1]]
                }
            },
            "worlds": [{
                "dimensions": [20.0, 20.0, 20.0],
                "nlist_cutoff": 3.0,
                "skin_thickness": 0.5,
                "seed": 5,
                "temperature": 1.0,
                "components": [["dimer", 2]],
                "particles": [
                    [0, "head", [5.0, 5.0, 5.0]],
                    [1, "tail", [6.0, 5.0, 5.0]],
                    [2, "head", [10.0, 10.0, 10.0]],
                    [3, "tail", [11.0, 10.0, 10.0]]
                ]
            }],
            "forcefields": {
                "bonded": [
                    {"type": "Harmonic", "species": ["head", "tail"], "k": 10.0, "r0": 1.0}
                ]
            },
            "moves": [{"type": "Translate", "dx": 0.3, "weight": 1}],
            "simulation": {"type": "Standard", "sweeps": 2, "seed": 9}
        });
        let config: Config = serde_json::from_value(value).unwrap();
        let engine = build_engine(&config).unwrap();
        match engine {
            Engine::Standard { simulation, .. } => {
                let w = simulation.worlds().world(0);
                assert_eq!(w.particle_count(), 2);
                // Two molecules of two sites each.
                assert_eq!(w.primitive_count(), 4);
                let mol = w.particles()[0];
                assert_eq!(w.particle(mol).children().len(), 2);
                assert!((w.particle(mol).mass() - 3.0).abs() < 1e-12);
                assert!((w.particle(mol).charge() - 0.0).abs() < 1e-12);
            }
            _ => panic!("expected a Standard engine"),
        }
    }

    #[test]
    fn missing_site_rows_are_reported_with_component_path() {
        let mut value = lattice_config(3);
        value["worlds"][0]["components"] = json!([["spin", 100]]);
        let config: Config = serde_json::from_value(value).unwrap();
        let errors = expect_errors(&config);
        assert!(errors
            .iter()
            .any(|e| matches!(e, BuildError::BadValue { path, .. } if path.contains("components"))));
    }
}
