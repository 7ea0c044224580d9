use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};

use crate::errors::AppError;
use crate::provider::{CompletionProvider, CompletionRequest, ProviderEvent, ProviderStream};

/// How the scripted provider answers.
pub enum Script {
    Events(Vec<ProviderEvent>),
    RefuseCall(String),
    FailMidStream(Vec<ProviderEvent>, String),
    Hang,
    /// Never yields; sets the flag once the stream is dropped.
    Silent(Arc<AtomicBool>),
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// In-memory provider that records every request it receives.
pub struct ScriptedProvider {
    script: Script,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(script: Script) -> Self {
        Self { script, requests: Mutex::new(Vec::new()) }
    }

    pub fn replying(deltas: &[&str]) -> Self {
        Self::new(Script::Events(
            deltas.iter().map(|d| ProviderEvent::TextDelta(d.to_string())).collect(),
        ))
    }

    pub fn last_request(&self) -> Option<CompletionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn stream_completion(&self, request: CompletionRequest) -> Result<ProviderStream, AppError> {
        self.requests.lock().unwrap().push(request);
        match &self.script {
            Script::Events(events) => Ok(Box::pin(stream::iter(events.clone().into_iter().map(Ok)))),
            Script::RefuseCall(message) => {
                Err(AppError::ProviderRejected { status: 500, message: message.clone() })
            }
            Script::FailMidStream(events, message) => {
                let failure = AppError::StreamAborted { message: message.clone() };
                Ok(Box::pin(
                    stream::iter(events.clone().into_iter().map(Ok))
                        .chain(stream::once(async move { Err(failure) })),
                ))
            }
            Script::Hang => Ok(Box::pin(stream::pending::<Result<ProviderEvent, AppError>>())),
            Script::Silent(dropped) => {
                let guard = DropFlag(Arc::clone(dropped));
                Ok(Box::pin(stream::pending::<Result<ProviderEvent, AppError>>().map(move |item| {
                    let _flag = &guard;
                    item
                })))
            }
        }
    }
}
