//! Streaming event merger.
//!
//! Merges the update streams of all concurrently executing invocations of a
//! step into one sequence. Per-invocation order is preserved (each source is
//! itself ordered and only ever polled in order); events from different
//! invocations interleave in arrival order, with no tie-break beyond poll
//! readiness. The merge is pull-based: sources are only polled when the
//! consumer asks for the next event, which is what propagates backpressure
//! (and, on drop, cancellation) to every executor.

use crate::dispatch::UpdateStream;
use futures::stream::{select_all, SelectAll};

/// Merge per-invocation update streams into a single arrival-ordered stream.
pub fn merge_updates(sources: Vec<UpdateStream>) -> SelectAll<UpdateStream> {
    select_all(sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::dispatch;
    use braid_contract::{InvocationStatus, ToolCall, ToolDefinition};
    use futures::stream::BoxStream;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;

    fn streaming_def(name: &str, yields: usize, delay_ms: u64) -> ToolDefinition {
        ToolDefinition::new(name, "streams partials").streaming_executor(move |_input, _ctx| {
            let stream: BoxStream<'static, Result<Value, braid_contract::ToolError>> =
                Box::pin(async_stream::stream! {
                    for i in 0..yields {
                        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                        yield Ok(json!({"step": i}));
                    }
                });
            stream
        })
    }

    /// Interleaving check: tool A yields 3 partials, tool B
    /// yields 1; the merged stream preserves each invocation's own order
    /// while interleaving across invocations arbitrarily.
    #[tokio::test]
    async fn per_invocation_order_is_preserved() {
        let a = dispatch(
            Some(Arc::new(streaming_def("a", 3, 1))),
            ToolCall::new("inv_a", "a", json!({})),
        );
        let b = dispatch(
            Some(Arc::new(streaming_def("b", 1, 2))),
            ToolCall::new("inv_b", "b", json!({})),
        );

        let merged: Vec<_> = merge_updates(vec![a, b]).collect().await;

        let a_updates: Vec<_> = merged
            .iter()
            .filter(|u| u.invocation_id == "inv_a")
            .collect();
        let b_updates: Vec<_> = merged
            .iter()
            .filter(|u| u.invocation_id == "inv_b")
            .collect();

        // A: executing + 3 partials + output; B: executing + 1 partial + output.
        assert_eq!(a_updates.len(), 5);
        assert_eq!(b_updates.len(), 3);

        let a_partials: Vec<_> = a_updates
            .iter()
            .filter_map(|u| u.payload.as_ref().map(|p| p["step"].clone()))
            .collect();
        assert_eq!(
            a_partials,
            vec![json!(0), json!(1), json!(2), json!(2)],
            "A's partials (and final, equal to the last partial) in order"
        );

        assert_eq!(a_updates.last().unwrap().status, InvocationStatus::OutputAvailable);
        assert_eq!(b_updates.last().unwrap().status, InvocationStatus::OutputAvailable);

        // Both sources interleave into one stream of all updates.
        assert_eq!(merged.len(), 8);
    }

    #[tokio::test]
    async fn slow_consumer_loses_nothing() {
        let a = dispatch(
            Some(Arc::new(streaming_def("a", 4, 1))),
            ToolCall::new("inv_a", "a", json!({})),
        );
        let b = dispatch(
            Some(Arc::new(streaming_def("b", 4, 1))),
            ToolCall::new("inv_b", "b", json!({})),
        );

        let mut merged = merge_updates(vec![a, b]);
        let mut seen = Vec::new();
        while let Some(update) = merged.next().await {
            seen.push(update);
            // Simulate a consumer that pulls slowly.
            tokio::task::yield_now().await;
        }
        assert_eq!(seen.len(), 12);
    }

    #[tokio::test]
    async fn dropping_the_merge_stops_all_sources() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        static POLLS: AtomicUsize = AtomicUsize::new(0);

        let def = ToolDefinition::new("endless", "never finishes").streaming_executor(
            |_input, _ctx| {
                Box::pin(async_stream::stream! {
                    loop {
                        POLLS.fetch_add(1, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(1)).await;
                        yield Ok(json!({}));
                    }
                })
            },
        );
        let stream = dispatch(
            Some(Arc::new(def)),
            ToolCall::new("inv_1", "endless", json!({})),
        );

        let mut merged = merge_updates(vec![stream]);
        let _ = merged.next().await;
        let _ = merged.next().await;
        drop(merged);

        let after_drop = POLLS.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            POLLS.load(Ordering::SeqCst),
            after_drop,
            "a dropped merge must not keep polling its sources"
        );
    }
}
