use tracing::debug;

/// Ordered diagnostic lines for one candidate event.
///
/// Lines are emitted at debug level as they are added and kept so they can
/// be attached to the event's classification.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventTrace {
    lines: Vec<String>,
}

impl EventTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, line: impl Into<String>) {
        let line = line.into();
        debug!("{}", line);
        self.lines.push(line);
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.lines.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lines_keep_order() {
        let mut trace = EventTrace::new();
        assert!(trace.is_empty());
        trace.log("possible match Tatort");
        trace.log(format!("service {}", "1:0:19:283D"));
        assert_eq!(trace.lines(), ["possible match Tatort", "service 1:0:19:283D"]);
    }
}
