use leptos::prelude::*;

use crate::components::prompt_input::PromptInput;
use crate::models::{ChatMessage, MessagePart, Role};
use crate::session::Status;
use crate::state::AppState;

/// Main chat area with message history, loader, error banner and input.
#[component]
pub fn ChatArea() -> impl IntoView {
    let state = expect_context::<AppState>();

    // Only changes when the history does; typing into the input leaves it alone
    let messages = Memo::new(move |_| state.session.with(|s| s.messages.clone()));
    let streaming_id =
        Memo::new(move |_| state.session.with(|s| s.streaming_message_id().map(str::to_string)));

    view! {
        <main class="chat-area">
            // Error banner
            {move || {
                state.session.with(|s| s.error.clone()).map(|err| {
                    view! {
                        <div class="error-banner">
                            <span>{err}</span>
                            <button class="dismiss-btn" on:click=move |_| state.dismiss_error()>
                                "×"
                            </button>
                        </div>
                    }
                })
            }}

            // Messages
            <div class="messages-container">
                <Show
                    when=move || messages.with(|m| !m.is_empty())
                    fallback=|| view! { <div class="empty-state">"Send a message to start chatting"</div> }
                >
                    <For
                        each=move || messages.get()
                        key=|m| m.id.clone()
                        let:msg
                    >
                        <MessageBubble id=msg.id role=msg.role messages=messages streaming_id=streaming_id />
                    </For>
                </Show>
                {move || {
                    (state.session.with(|s| s.status) == Status::Submitted)
                        .then(|| view! { <div class="loader">"Thinking…"</div> })
                }}
            </div>

            <PromptInput />
        </main>
    }
}

/// One message: its sources disclosure, then its parts in order.
///
/// Parts are append-only, so each one is rendered once and only its text is
/// reactive. Disclosures keep whatever open state the user gave them.
#[component]
fn MessageBubble(
    id: String,
    role: Role,
    messages: Memo<Vec<ChatMessage>>,
    streaming_id: Memo<Option<String>>,
) -> impl IntoView {
    let streaming = {
        let id = id.clone();
        Signal::derive(move || streaming_id.with(|s| s.as_deref() == Some(id.as_str())))
    };
    let parts = Memo::new(move |_| {
        messages.with(|ms| ms.iter().find(|m| m.id == id).map(|m| m.parts.clone()).unwrap_or_default())
    });
    let sources = Memo::new(move |_| {
        parts.with(|ps| {
            ps.iter()
                .filter_map(|part| match part {
                    MessagePart::SourceUrl { url, title, .. } => {
                        Some((url.clone(), title.clone().unwrap_or_else(|| url.clone())))
                    }
                    _ => None,
                })
                .collect::<Vec<_>>()
        })
    });
    let part_count = Memo::new(move |_| parts.with(Vec::len));

    let role = role.as_str();
    view! {
        <div class=format!("message {role}")>
            <div class="role-label">{role}</div>
            <Show when=move || sources.with(|s| !s.is_empty())>
                <details class="sources">
                    <summary>
                        {move || {
                            let count = sources.with(Vec::len);
                            format!("Used {count} source{}", if count == 1 { "" } else { "s" })
                        }}
                    </summary>
                    <ul>
                        <For
                            each=move || sources.get()
                            key=|(url, _)| url.clone()
                            children=|(url, title)| {
                                view! {
                                    <li>
                                        <a href=url target="_blank" rel="noreferrer">{title}</a>
                                    </li>
                                }
                            }
                        />
                    </ul>
                </details>
            </Show>
            <For
                each=move || 0..part_count.get()
                key=|index| *index
                children=move |index| view! { <PartView parts=parts index=index streaming=streaming /> }
            />
        </div>
    }
}

#[component]
fn PartView(parts: Memo<Vec<MessagePart>>, index: usize, streaming: Signal<bool>) -> impl IntoView {
    let text = move || {
        parts.with(|ps| match ps.get(index) {
            Some(MessagePart::Text { text } | MessagePart::Reasoning { text }) => text.clone(),
            _ => String::new(),
        })
    };

    match parts.with_untracked(|ps| ps.get(index).cloned()) {
        Some(MessagePart::Text { .. }) => view! { <div class="text-part">{text}</div> }.into_any(),
        Some(MessagePart::Reasoning { .. }) => view! {
            // Open while the reply streams in; the user toggles it afterwards
            <details class="reasoning" open=streaming.get_untracked()>
                <summary>{move || if streaming.get() { "Thinking…" } else { "Reasoning" }}</summary>
                <div class="reasoning-content">{text}</div>
            </details>
        }
        .into_any(),
        Some(MessagePart::File { url, .. }) => {
            view! { <img class="attachment-image" src=url alt="Attached image" /> }.into_any()
        }
        Some(MessagePart::SourceUrl { .. }) | None => ().into_any(),
    }
}
