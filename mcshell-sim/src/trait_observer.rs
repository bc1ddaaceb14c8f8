use mcshell_statistics::Histogram;
use mcshell_system::World;

/// Flat-histogram state exposed to observers during DOS runs.
pub struct DosState<'a> {
    pub flatness: f64,
    pub convergence_factor: f64,
    pub op_value: f64,
    pub histogram: &'a Histogram,
}

/// Read-only view of engine state handed to observers at their intervals.
pub struct SimState<'a> {
    pub iteration: usize,
    pub worlds: &'a [World],
    pub acceptance: &'a [(&'static str, f64)],
    pub dos: Option<DosState<'a>>,
}

/// Takes read-only observations of the running simulation.
///
/// Observers never mutate engine state; drivers call them at the lag times
/// configured in the owning [`ObserverSet`].
pub trait Observer: Send {
    fn observe(&mut self, state: &SimState);

    /// Writes buffered data to its sink.
    fn flush(&mut self);

    fn name(&self) -> &str;
}

/// A set of observers with per-observer lag times.
#[derive(Default)]
pub struct ObserverSet {
    observers: Vec<Box<dyn Observer>>,
    lag_times: Vec<usize>,
}

impl ObserverSet {
    pub fn new() -> ObserverSet {
        ObserverSet::default()
    }

    /// Adds an observer that fires every `lag_time` iterations.
    pub fn add_observer(&mut self, observer: Box<dyn Observer>, lag_time: usize) {
        assert!(lag_time > 0, "observer lag time must be positive");
        self.observers.push(observer);
        self.lag_times.push(lag_time);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Notifies every observer whose lag divides the current iteration.
    pub fn notify(&mut self, state: &SimState) {
        for (observer, &lag) in self.observers.iter_mut().zip(self.lag_times.iter()) {
            if state.iteration % lag == 0 {
                observer.observe(state);
            }
        }
    }

    pub fn flush_all(&mut self) {
        for observer in self.observers.iter_mut() {
            observer.flush();
        }
    }
}
