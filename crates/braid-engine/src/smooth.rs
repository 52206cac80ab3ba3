//! Word-boundary smoothing of streamed text deltas.
//!
//! Providers chunk text at token boundaries, which makes raw deltas jittery
//! to render. This combinator re-chunks `text-delta` events so each emitted
//! delta ends on a whitespace boundary, holding back at most one partial
//! word. Non-text events flush the held text first, so relative order with
//! tool and lifecycle events is preserved and the concatenated text is
//! unchanged.

use crate::scheduler::RunStream;
use braid_contract::RunEvent;
use futures::StreamExt;

/// Split off the longest prefix ending in whitespace, leaving the partial
/// trailing word in `buffer`.
fn take_ready(buffer: &mut String) -> Option<String> {
    let split = buffer
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(idx, c)| idx + c.len_utf8())?;
    let rest = buffer.split_off(split);
    Some(std::mem::replace(buffer, rest))
}

/// Re-chunk text deltas on word boundaries; all other events pass through.
pub fn smooth_text_deltas(mut events: RunStream) -> RunStream {
    Box::pin(async_stream::stream! {
        let mut buffer = String::new();
        let mut buffer_message: Option<String> = None;

        while let Some(event) = events.next().await {
            match event {
                RunEvent::TextDelta { message_id, delta } => {
                    if buffer_message.as_deref() != Some(message_id.as_str()) {
                        if let Some(previous) = buffer_message.take() {
                            if !buffer.is_empty() {
                                yield RunEvent::text_delta(previous, std::mem::take(&mut buffer));
                            }
                        }
                        buffer_message = Some(message_id.clone());
                    }
                    buffer.push_str(&delta);
                    if let Some(ready) = take_ready(&mut buffer) {
                        yield RunEvent::text_delta(message_id, ready);
                    }
                }
                other => {
                    if !buffer.is_empty() {
                        if let Some(message_id) = buffer_message.clone() {
                            yield RunEvent::text_delta(message_id, std::mem::take(&mut buffer));
                        }
                    }
                    yield other;
                }
            }
        }

        if let (Some(message_id), false) = (buffer_message, buffer.is_empty()) {
            yield RunEvent::text_delta(message_id, buffer);
        }
    })
}
