/// Events emitted by long-running workflows so front ends can render progress.
#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    TaskStart { total_steps: u64 },
    TaskIncrement,
    TaskFinish,

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    /// A reporter that drops every event.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }

    /// Reports one finished structure together with a status line.
    pub fn step(&self, message: impl Into<String>) {
        self.report(Progress::Message(message.into()));
        self.report(Progress::TaskIncrement);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn callback_receives_events_in_order() {
        let seen = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            let tag = match event {
                Progress::TaskIncrement => "inc".to_string(),
                Progress::Message(m) => m,
                other => format!("{:?}", other),
            };
            seen.lock().unwrap().push(tag);
        }));

        reporter.step("1_dimer done");
        drop(reporter);
        assert_eq!(seen.into_inner().unwrap(), vec!["1_dimer done", "inc"]);
    }

    #[test]
    fn silent_reporter_ignores_events() {
        ProgressReporter::new().report(Progress::PhaseFinish);
    }
}
