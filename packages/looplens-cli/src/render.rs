use looplens_core::{Frame, PendingTimer, QueuedTask, Snapshot, Timeline};
use std::fmt;

/// One line per snapshot, for `run --format text`.
pub struct Summary<'a>(pub &'a Timeline);

impl fmt::Display for Summary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for snapshot in self.0 {
            writeln!(
                f,
                "{:>4}  {:<18}  {:>5}  {}",
                snapshot.id,
                snapshot.phase.as_str(),
                line_label(snapshot.highlight_line),
                snapshot.description
            )?;
        }
        writeln!(f)?;
        writeln!(f, "output:")?;
        for line in self.0.final_output() {
            writeln!(f, "  {line}")?;
        }
        Ok(())
    }
}

/// Full view of a single step, for `show` and `play`.
pub struct Detail<'a> {
    pub snapshot: &'a Snapshot,
    pub total: usize,
}

impl fmt::Display for Detail<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.snapshot;
        writeln!(f, "step {}/{}  [{}]  {}", s.id + 1, self.total, s.phase, s.description)?;
        if let Some(line) = s.highlight_line {
            writeln!(f, "  line        {line}")?;
        }
        writeln!(f, "  call stack  {}", join(&s.stack, frame_label, " > "))?;
        writeln!(f, "  web apis    {}", join(&s.pending_timers, timer_label, ", "))?;
        writeln!(f, "  microtasks  {}", join(&s.deferred_queue, task_label, ", "))?;
        writeln!(f, "  macrotasks  {}", join(&s.ready_queue, task_label, ", "))?;
        writeln!(f, "  console")?;
        for line in &s.output {
            writeln!(f, "    {line}")?;
        }
        Ok(())
    }
}

fn line_label(line: Option<usize>) -> String {
    match line {
        Some(line) => format!("L{line}"),
        None => "-".to_string(),
    }
}

fn frame_label(frame: &Frame) -> String {
    frame.name.clone()
}

fn timer_label(timer: &PendingTimer) -> String {
    format!("timer#{} ({}ms)", timer.id, timer.delay)
}

fn task_label(task: &QueuedTask) -> String {
    format!("{}#{}", task.name, task.id)
}

fn join<T>(items: &[T], label: fn(&T) -> String, sep: &str) -> String {
    if items.is_empty() {
        return "(empty)".to_string();
    }
    items.iter().map(label).collect::<Vec<_>>().join(sep)
}

#[cfg(test)]
mod tests {
    use super::*;
    use looplens_scheduler::generate;

    #[test]
    fn test_summary_lists_every_step_and_output() {
        let timeline = generate("console.log('hi');");
        let text = Summary(&timeline).to_string();
        assert_eq!(text.lines().filter(|l| l.contains("Output: hi")).count(), 1);
        assert!(text.ends_with("output:\n  hi\n"));
    }

    #[test]
    fn test_detail_shows_queues() {
        let timeline = generate("setTimeout(() => {}, 25);");
        let added = timeline
            .iter()
            .find(|s| s.description == "Add to Web APIs")
            .unwrap();
        let text = Detail {
            snapshot: added,
            total: timeline.len(),
        }
        .to_string();
        assert!(text.contains("call stack  main() > setTimeout"));
        assert!(text.contains("(25ms)"));
        assert!(text.contains("microtasks  (empty)"));
    }
}
