use std::fs::File;
use std::io::{BufWriter, Write};

use log::info;

use crate::trait_observer::{Observer, SimState};

/// Which quantities a file observer writes.
#[derive(Clone, Copy, Debug)]
pub struct ObserverFlags {
    pub iteration: bool,
    pub temperature: bool,
    pub volume: bool,
    pub density: bool,
    pub energy: bool,
    pub pressure: bool,
    pub composition: bool,
    pub acceptance: bool,
    pub dos: bool,
    pub particles: bool,
}

impl Default for ObserverFlags {
    fn default() -> ObserverFlags {
        ObserverFlags {
            iteration: true,
            temperature: true,
            volume: true,
            density: true,
            energy: true,
            pressure: true,
            composition: true,
            acceptance: false,
            dos: false,
            particles: false,
        }
    }
}

/// Writes delimited per-quantity columns, one file per world plus an
/// optional particle trajectory file.
pub struct DlmFileObserver {
    prefix: String,
    delimiter: String,
    flags: ObserverFlags,
    writers: Vec<BufWriter<File>>,
    particle_writers: Vec<BufWriter<File>>,
    wrote_header: bool,
}

impl DlmFileObserver {
    pub fn new(prefix: &str, flags: ObserverFlags) -> DlmFileObserver {
        DlmFileObserver {
            prefix: prefix.to_string(),
            delimiter: " ".to_string(),
            flags,
            writers: Vec::new(),
            particle_writers: Vec::new(),
            wrote_header: false,
        }
    }

    pub fn set_delimiter(&mut self, delimiter: &str) {
        self.delimiter = delimiter.to_string();
    }

    fn ensure_writers(&mut self, world_count: usize) -> std::io::Result<()> {
        while self.writers.len() < world_count {
            let i = self.writers.len();
            let path = format!("{}.world{}.dat", self.prefix, i);
            info!("opening observer output {}", path);
            self.writers.push(BufWriter::new(File::create(path)?));
            if self.flags.particles {
                let ppath = format!("{}.particle{}.dat", self.prefix, i);
                self.particle_writers.push(BufWriter::new(File::create(ppath)?));
            }
        }
        Ok(())
    }

    fn write_header(&mut self, state: &SimState) -> std::io::Result<()> {
        for (wi, w) in state.worlds.iter().enumerate() {
            let d = self.delimiter.clone();
            let out = &mut self.writers[wi];
            let mut cols: Vec<String> = Vec::new();
            if self.flags.iteration {
                cols.push("iteration".into());
            }
            if self.flags.temperature {
                cols.push("temperature".into());
            }
            if self.flags.volume {
                cols.push("volume".into());
            }
            if self.flags.density {
                cols.push("density".into());
            }
            if self.flags.energy {
                for name in [
                    "e_intervdw",
                    "e_intravdw",
                    "e_interelectrostatic",
                    "e_intraelectrostatic",
                    "e_bonded",
                    "e_connectivity",
                    "e_tail",
                    "e_total",
                ] {
                    cols.push(name.into());
                }
            }
            if self.flags.pressure {
                for name in ["p_ideal", "p_xx", "p_yy", "p_zz", "p_tail", "p_isotropic"] {
                    cols.push(name.into());
                }
            }
            if self.flags.composition {
                for species in w.composition().keys() {
                    cols.push(format!("n_{}", species));
                }
            }
            if self.flags.dos {
                cols.push("flatness".into());
                cols.push("convergence_factor".into());
                cols.push("op".into());
            }
            writeln!(out, "{}", cols.join(&d))?;
        }
        Ok(())
    }
}

impl Observer for DlmFileObserver {
    fn observe(&mut self, state: &SimState) {
        if self.ensure_writers(state.worlds.len()).is_err() {
            return;
        }
        if !self.wrote_header {
            if self.write_header(state).is_err() {
                return;
            }
            self.wrote_header = true;
        }

        for (wi, w) in state.worlds.iter().enumerate() {
            let d = self.delimiter.clone();
            let mut cols: Vec<String> = Vec::new();
            if self.flags.iteration {
                cols.push(format!("{}", state.iteration));
            }
            if self.flags.temperature {
                cols.push(format!("{:.8}", w.temperature()));
            }
            if self.flags.volume {
                cols.push(format!("{:.8}", w.volume()));
            }
            if self.flags.density {
                cols.push(format!("{:.8}", w.density()));
            }
            if self.flags.energy {
                let e = w.energy();
                for v in [
                    e.inter_vdw,
                    e.intra_vdw,
                    e.inter_electrostatic,
                    e.intra_electrostatic,
                    e.bonded,
                    e.connectivity,
                    e.tail,
                    e.total(),
                ] {
                    cols.push(format!("{:.10e}", v));
                }
            }
            if self.flags.pressure {
                let p = w.pressure();
                for v in [p.ideal, p.pxx, p.pyy, p.pzz, p.ptail, p.isotropic()] {
                    cols.push(format!("{:.10e}", v));
                }
            }
            if self.flags.composition {
                for count in w.composition().values() {
                    cols.push(format!("{}", count));
                }
            }
            if let Some(dos) = &state.dos {
                if self.flags.dos {
                    cols.push(format!("{:.6}", dos.flatness));
                    cols.push(format!("{:.6e}", dos.convergence_factor));
                    cols.push(format!("{:.8}", dos.op_value));
                }
            }
            let _ = writeln!(self.writers[wi], "{}", cols.join(&d));

            if self.flags.particles {
                for &p in w.particles() {
                    let particle = w.particle(p);
                    let pos = particle.position();
                    let dir = particle.director();
                    let _ = writeln!(
                        self.particle_writers[wi],
                        "{}{d}{}{d}{}{d}{:.8}{d}{:.8}{d}{:.8}{d}{:.8}{d}{:.8}{d}{:.8}",
                        state.iteration,
                        particle.id(),
                        particle.species(),
                        pos.x,
                        pos.y,
                        pos.z,
                        dir.x,
                        dir.y,
                        dir.z,
                        d = d
                    );
                }
            }
        }
    }

    fn flush(&mut self) {
        for w in self.writers.iter_mut() {
            let _ = w.flush();
        }
        for w in self.particle_writers.iter_mut() {
            let _ = w.flush();
        }
    }

    fn name(&self) -> &str {
        "DlmFile"
    }
}

/// Prints a one-line summary per world to standard output.
pub struct ConsoleObserver;

impl Observer for ConsoleObserver {
    fn observe(&mut self, state: &SimState) {
        for (wi, w) in state.worlds.iter().enumerate() {
            print!(
                "{:8} world {}: N = {:6} V = {:12.4} E = {:14.6}",
                state.iteration,
                wi,
                w.particle_count(),
                w.volume(),
                w.energy().total()
            );
            if let Some(dos) = &state.dos {
                print!(" flatness = {:.4} f = {:.4e}", dos.flatness, dos.convergence_factor);
            }
            println!();
        }
    }

    fn flush(&mut self) {}

    fn name(&self) -> &str {
        "Console"
    }
}
