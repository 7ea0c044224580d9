use std::collections::HashSet;

use crate::models::UiEvent;
use crate::provider::ProviderEvent;

#[derive(Debug, Clone, PartialEq)]
enum Block {
    Text(String),
    Reasoning(String),
}

/// Re-encodes provider events as UI message-stream events.
///
/// Consecutive deltas of one kind share a block; switching between text and
/// reasoning closes the open block and starts a new one. `start` precedes
/// everything, and exactly one terminal event (`finish` or `error`) ends the
/// stream.
#[derive(Debug)]
pub struct UiStreamEncoder {
    message_id: String,
    started: bool,
    finished: bool,
    open: Option<Block>,
    next_block: usize,
    seen_sources: HashSet<String>,
}

impl UiStreamEncoder {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            started: false,
            finished: false,
            open: None,
            next_block: 0,
            seen_sources: HashSet::new(),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn start(&mut self) -> Vec<UiEvent> {
        let mut out = Vec::new();
        self.ensure_started(&mut out);
        out
    }

    pub fn push(&mut self, event: ProviderEvent) -> Vec<UiEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        self.ensure_started(&mut out);

        match event {
            ProviderEvent::TextDelta(delta) => {
                let id = match &self.open {
                    Some(Block::Text(id)) => id.clone(),
                    _ => {
                        self.close_block(&mut out);
                        let id = self.block_id("text");
                        out.push(UiEvent::TextStart { id: id.clone() });
                        self.open = Some(Block::Text(id.clone()));
                        id
                    }
                };
                out.push(UiEvent::TextDelta { id, delta });
            }
            ProviderEvent::ReasoningDelta(delta) => {
                let id = match &self.open {
                    Some(Block::Reasoning(id)) => id.clone(),
                    _ => {
                        self.close_block(&mut out);
                        let id = self.block_id("reasoning");
                        out.push(UiEvent::ReasoningStart { id: id.clone() });
                        self.open = Some(Block::Reasoning(id.clone()));
                        id
                    }
                };
                out.push(UiEvent::ReasoningDelta { id, delta });
            }
            ProviderEvent::Source { url, title } => {
                if self.seen_sources.insert(url.clone()) {
                    let source_id = format!("source-{}", self.seen_sources.len() - 1);
                    out.push(UiEvent::SourceUrl { source_id, url, title });
                }
            }
            ProviderEvent::Finish { reason } => {
                out.extend(self.finish(reason));
            }
        }
        out
    }

    /// Close the stream normally. A no-op once a terminal event was emitted.
    pub fn finish(&mut self, finish_reason: Option<String>) -> Vec<UiEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        self.ensure_started(&mut out);
        self.close_block(&mut out);
        out.push(UiEvent::Finish { finish_reason });
        self.finished = true;
        out
    }

    /// Close the stream with an error. A no-op once a terminal event was emitted.
    pub fn fail(&mut self, error_text: impl Into<String>) -> Vec<UiEvent> {
        let mut out = Vec::new();
        if self.finished {
            return out;
        }
        self.ensure_started(&mut out);
        self.close_block(&mut out);
        out.push(UiEvent::Error { error_text: error_text.into() });
        self.finished = true;
        out
    }

    fn ensure_started(&mut self, out: &mut Vec<UiEvent>) {
        if !self.started {
            self.started = true;
            out.push(UiEvent::Start { message_id: self.message_id.clone() });
        }
    }

    fn close_block(&mut self, out: &mut Vec<UiEvent>) {
        match self.open.take() {
            Some(Block::Text(id)) => out.push(UiEvent::TextEnd { id }),
            Some(Block::Reasoning(id)) => out.push(UiEvent::ReasoningEnd { id }),
            None => {}
        }
    }

    fn block_id(&mut self, kind: &str) -> String {
        let id = format!("{kind}-{}", self.next_block);
        self.next_block += 1;
        id
    }
}
