//! Pipeline events and callbacks for observability.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

/// Events emitted during a research run.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    /// Planning the outline for a topic
    PlanningStart { topic: String },
    /// The outline is ready
    OutlineReady { title: String, sections: usize },
    /// Starting work on a section
    SectionStart {
        index: usize,
        total: usize,
        title: String,
    },
    /// Section already finalized by a previous run
    SectionSkipped { title: String },
    /// A search query was issued for a section
    SearchIssued {
        section: String,
        query: String,
        attempt: usize,
    },
    /// A search returned
    SearchCompleted { section: String, results: usize },
    /// The reflection step judged the evidence
    Reflection {
        section: String,
        sufficient: bool,
        next_query: Option<String>,
        reflection_count: usize,
    },
    /// Section content was written
    SectionSynthesized { title: String, chars: usize },
    /// Section research or synthesis failed
    SectionFailed {
        title: String,
        message: String,
        placeholder: bool,
    },
    /// The state was snapshotted to disk
    SnapshotSaved { path: PathBuf },
    /// The Markdown report was assembled
    ReportAssembled { chars: usize },
    /// Data charts were extracted from the report
    ChartsExtracted { charts: usize },
    /// An error occurred
    Error { message: String },
}

/// Type alias for event callbacks
pub type EventCallback = Arc<dyn Fn(&PipelineEvent) + Send + Sync>;

/// Storage for pipeline callbacks
#[derive(Default, Clone)]
pub struct PipelineCallbacks {
    pub on_section_start: Option<EventCallback>,
    pub on_search: Option<EventCallback>,
    pub on_reflection: Option<EventCallback>,
    pub on_section_done: Option<EventCallback>,
    pub on_error: Option<EventCallback>,
    /// Catch-all callback for any event
    pub on_event: Option<EventCallback>,
    /// Captured events, for inspection after a run
    pub(crate) captured_events: Option<Arc<Mutex<Vec<PipelineEvent>>>>,
}

impl PipelineCallbacks {
    /// Emit an event to the appropriate callback(s)
    pub fn emit(&self, event: &PipelineEvent) {
        if let Some(ref events) = self.captured_events
            && let Ok(mut events) = events.lock()
        {
            events.push(event.clone());
        }

        let specific = match event {
            PipelineEvent::SectionStart { .. } | PipelineEvent::SectionSkipped { .. } => {
                self.on_section_start.as_ref()
            }
            PipelineEvent::SearchIssued { .. } | PipelineEvent::SearchCompleted { .. } => {
                self.on_search.as_ref()
            }
            PipelineEvent::Reflection { .. } => self.on_reflection.as_ref(),
            PipelineEvent::SectionSynthesized { .. } => self.on_section_done.as_ref(),
            PipelineEvent::SectionFailed { .. } | PipelineEvent::Error { .. } => {
                self.on_error.as_ref()
            }
            _ => None,
        };

        if let Some(cb) = specific {
            cb(event);
        }

        if let Some(cb) = &self.on_event {
            cb(event);
        }
    }

    /// Take the captured events, leaving the buffer empty.
    pub fn take_captured(&self) -> Vec<PipelineEvent> {
        self.captured_events
            .as_ref()
            .and_then(|events| events.lock().ok().map(|mut e| std::mem::take(&mut *e)))
            .unwrap_or_default()
    }
}

fn preview(text: &str, max: usize) -> String {
    let head: String = text.chars().take(max).collect();
    let suffix = if text.chars().count() > max { "..." } else { "" };
    format!("{}{}", head.replace('\n', "\\n"), suffix)
}

/// Callbacks that forward every event to `tracing` at info level.
pub fn verbose_callbacks() -> PipelineCallbacks {
    PipelineCallbacks {
        on_event: Some(Arc::new(|e| match e {
            PipelineEvent::PlanningStart { topic } => {
                tracing::info!(topic = %topic, "Planning report outline");
            }
            PipelineEvent::OutlineReady { title, sections } => {
                tracing::info!(title = %title, sections, "Outline ready");
            }
            PipelineEvent::SectionStart {
                index,
                total,
                title,
            } => {
                tracing::info!("Section {}/{}: {}", index + 1, total, title);
            }
            PipelineEvent::SectionSkipped { title } => {
                tracing::info!(section = %title, "Section already finalized, skipping");
            }
            PipelineEvent::SearchIssued {
                section,
                query,
                attempt,
            } => {
                tracing::info!(section = %section, attempt, "Search: {}", preview(query, 100));
            }
            PipelineEvent::SearchCompleted { section, results } => {
                tracing::info!(section = %section, results, "Search completed");
            }
            PipelineEvent::Reflection {
                section,
                sufficient,
                next_query,
                reflection_count,
            } => {
                tracing::info!(
                    section = %section,
                    sufficient,
                    reflection_count,
                    next_query = next_query.as_deref().unwrap_or("-"),
                    "Reflection"
                );
            }
            PipelineEvent::SectionSynthesized { title, chars } => {
                tracing::info!(section = %title, chars, "Section written");
            }
            PipelineEvent::SectionFailed {
                title,
                message,
                placeholder,
            } => {
                tracing::warn!(section = %title, placeholder, "Section failed: {}", message);
            }
            PipelineEvent::SnapshotSaved { path } => {
                tracing::info!(path = %path.display(), "State snapshot saved");
            }
            PipelineEvent::ReportAssembled { chars } => {
                tracing::info!(chars, "Report assembled");
            }
            PipelineEvent::ChartsExtracted { charts } => {
                tracing::info!(charts, "Data charts ready");
            }
            PipelineEvent::Error { message } => {
                tracing::error!("{}", message);
            }
        })),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_specific_and_catch_all_callbacks() {
        let specific = Arc::new(AtomicUsize::new(0));
        let all = Arc::new(AtomicUsize::new(0));
        let (s, a) = (specific.clone(), all.clone());

        let callbacks = PipelineCallbacks {
            on_reflection: Some(Arc::new(move |_| {
                s.fetch_add(1, Ordering::SeqCst);
            })),
            on_event: Some(Arc::new(move |_| {
                a.fetch_add(1, Ordering::SeqCst);
            })),
            ..Default::default()
        };

        callbacks.emit(&PipelineEvent::Reflection {
            section: "s".into(),
            sufficient: true,
            next_query: None,
            reflection_count: 0,
        });
        callbacks.emit(&PipelineEvent::ReportAssembled { chars: 10 });

        assert_eq!(specific.load(Ordering::SeqCst), 1);
        assert_eq!(all.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_capture() {
        let callbacks = PipelineCallbacks {
            captured_events: Some(Arc::new(Mutex::new(Vec::new()))),
            ..Default::default()
        };
        callbacks.emit(&PipelineEvent::Error {
            message: "x".into(),
        });
        assert_eq!(callbacks.take_captured().len(), 1);
        assert!(callbacks.take_captured().is_empty());
    }

    #[test]
    fn test_preview() {
        assert_eq!(preview("a\nb", 10), "a\\nb");
        assert_eq!(preview("abcdef", 3), "abc...");
    }
}
