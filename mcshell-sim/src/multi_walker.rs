use std::sync::mpsc;
use std::thread;

use log::info;

use crate::dos_simulation::DosSimulation;

enum WalkerReport {
    Sync { id: usize, values: Vec<f64>, flat: bool },
}

enum MasterOrder {
    /// Keep sweeping with the combined values and current factor.
    Continue { values: Vec<f64>, factor: f64 },
    /// Flatness reached on the master: reset counts, take the reduced factor.
    Reduce { values: Vec<f64>, factor: f64 },
    Stop,
}

/// Multi-walker Wang-Landau sampling.
///
/// Each walker owns its world, forcefield manager, move set and histogram;
/// walkers share only the convergence schedule. Every `sync_frequency`
/// iterations the walkers meet at a barrier where their log-DOS value
/// arrays are combined element-wise (mean over non-zero entries) and
/// broadcast back, and the master walker (index 0) decides when the
/// convergence factor is reduced for everyone. Worker threads never share
/// mutable state; coordination is pure message passing.
pub struct MultiWalkerDos {
    walkers: Vec<DosSimulation>,
    sync_frequency: usize,
}

/// Element-wise mean over the walkers' non-zero entries.
fn combine_values(all: &[Vec<f64>]) -> Vec<f64> {
    let bins = all[0].len();
    let mut combined = vec![0.0; bins];
    for bin in 0..bins {
        let mut sum = 0.0;
        let mut contributors = 0usize;
        for values in all {
            if values[bin] != 0.0 {
                sum += values[bin];
                contributors += 1;
            }
        }
        if contributors > 0 {
            combined[bin] = sum / contributors as f64;
        }
    }
    combined
}

impl MultiWalkerDos {
    /// All walkers must carry histograms with the same bin count; their
    /// intervals may differ (windowed sampling).
    pub fn new(walkers: Vec<DosSimulation>, sync_frequency: usize) -> MultiWalkerDos {
        assert!(!walkers.is_empty(), "at least one walker is required");
        assert!(sync_frequency > 0, "sync frequency must be positive");
        let bins = walkers[0].order_parameter().histogram().bin_count();
        for w in &walkers {
            assert_eq!(
                w.order_parameter().histogram().bin_count(),
                bins,
                "walker histograms must share a bin count"
            );
        }
        MultiWalkerDos { walkers, sync_frequency }
    }

    pub fn walkers(&self) -> &[DosSimulation] {
        &self.walkers
    }

    /// Runs the schedule for a number of convergence-factor reductions and
    /// returns with every walker holding its final state.
    pub fn run(&mut self, reductions: usize) {
        let sync = self.sync_frequency;
        let walker_count = self.walkers.len();
        let reduction_factor = self.walkers[0].reduction_factor();
        info!(
            "running {} DOS walkers, syncing every {} iterations",
            walker_count, sync
        );

        let (report_tx, report_rx) = mpsc::channel::<WalkerReport>();
        let mut order_txs = Vec::with_capacity(walker_count);
        let mut finished: Vec<Option<DosSimulation>> = (0..walker_count).map(|_| None).collect();

        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(walker_count);
            for (id, mut walker) in self.walkers.drain(..).enumerate() {
                let tx = report_tx.clone();
                let (order_tx, order_rx) = mpsc::channel::<MasterOrder>();
                order_txs.push(order_tx);
                handles.push(scope.spawn(move || {
                    loop {
                        for _ in 0..sync {
                            if walker.flatness() >= walker.target_flatness() {
                                break;
                            }
                            walker.sweep_iteration();
                        }
                        let flat = walker.flatness() >= walker.target_flatness();
                        let values = walker.order_parameter().histogram().values().to_vec();
                        tx.send(WalkerReport::Sync { id, values, flat }).unwrap();

                        match order_rx.recv().unwrap() {
                            MasterOrder::Continue { values, factor } => {
                                walker.order_parameter_mut().histogram_mut().set_values(&values);
                                walker.set_convergence_factor(factor);
                            }
                            MasterOrder::Reduce { values, factor } => {
                                let hist = walker.order_parameter_mut().histogram_mut();
                                hist.set_values(&values);
                                hist.reset_counts();
                                walker.set_convergence_factor(factor);
                            }
                            MasterOrder::Stop => break,
                        }
                    }
                    (id, walker)
                }));
            }
            drop(report_tx);

            // Coordinator: collect one report per walker, combine, decide.
            let mut factor = 1.0;
            let mut done = 0usize;
            loop {
                let mut reports: Vec<Option<(Vec<f64>, bool)>> =
                    (0..walker_count).map(|_| None).collect();
                for _ in 0..walker_count {
                    let WalkerReport::Sync { id, values, flat } = report_rx.recv().unwrap();
                    reports[id] = Some((values, flat));
                }
                let all: Vec<Vec<f64>> =
                    reports.iter().map(|r| r.as_ref().unwrap().0.clone()).collect();
                let combined = combine_values(&all);
                let master_flat = reports[0].as_ref().unwrap().1;

                if master_flat {
                    factor *= reduction_factor;
                    done += 1;
                    if done >= reductions {
                        for tx in &order_txs {
                            let _ = tx.send(MasterOrder::Stop);
                        }
                        break;
                    }
                    for tx in &order_txs {
                        let _ = tx.send(MasterOrder::Reduce {
                            values: combined.clone(),
                            factor,
                        });
                    }
                } else {
                    for tx in &order_txs {
                        let _ = tx.send(MasterOrder::Continue {
                            values: combined.clone(),
                            factor,
                        });
                    }
                }
            }

            for handle in handles {
                let (id, walker) = handle.join().unwrap();
                finished[id] = Some(walker);
            }
        });

        self.walkers = finished.into_iter().map(|w| w.unwrap()).collect();
    }
}
