use std::{
    collections::BTreeMap,
    time::{
        Duration,
        Instant,
    },
};


/// label-indexed stage timings for one frame, cleared with `reset`
#[derive(Clone, Debug, Default)]
pub struct FrameProfiler {
    timings: BTreeMap<String, Duration>,
}

impl FrameProfiler {
    pub fn reset(&mut self) {
        self.timings.clear();
    }

    pub fn time<T>(&mut self, label: &str, f: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        let result = f();
        self.record(label, start.elapsed());
        result
    }

    /// accumulates when a label is recorded more than once per frame
    pub fn record(&mut self, label: &str, elapsed: Duration) {
        *self.timings.entry(label.to_string()).or_default() += elapsed;
    }

    pub fn get(&self, label: &str) -> Option<Duration> {
        self.timings.get(label).copied()
    }

    pub fn total(&self) -> Duration {
        self.timings.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Duration)> {
        self.timings.iter().map(|(label, elapsed)| (label.as_str(), *elapsed))
    }

    pub fn report(&self) {
        for (label, elapsed) in self.iter() {
            tracing::debug!("{label}: {elapsed:?}");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_reset() {
        let mut profiler = FrameProfiler::default();

        let value = profiler.time("sort", || 42);
        assert_eq!(value, 42);
        assert!(profiler.get("sort").is_some());

        profiler.record("upload", Duration::from_millis(2));
        profiler.record("upload", Duration::from_millis(3));
        assert_eq!(profiler.get("upload"), Some(Duration::from_millis(5)));
        assert!(profiler.total() >= Duration::from_millis(5));

        profiler.reset();
        assert_eq!(profiler.get("upload"), None);
        assert_eq!(profiler.iter().count(), 0);
    }
}
