//! Streaming Adapter: replays a finished pipeline outcome as a
//! sequence of named events over a channel, rather than a generator —
//! per the redesign, callers drain events instead of driving yields.

use tokio::sync::mpsc::Sender;

use policyrag_core::{Response, StreamEvent};

pub struct StreamingAdapter;

impl StreamingAdapter {
    /// Emits the full event sequence for a finished `Response`. Early
    /// terminal outcomes (clarification, out-of-scope, adversarial) skip
    /// the progress events entirely since retrieval never ran for them.
    pub async fn emit(&self, response: &Response, tx: &Sender<StreamEvent>) {
        if let Some(ref clarification) = response.clarification {
            let _ = tx
                .send(StreamEvent::Clarification {
                    message: clarification.message.clone(),
                    options: clarification.options.clone(),
                })
                .await;
            let _ = tx.send(StreamEvent::Done).await;
            return;
        }

        let _ = tx.send(StreamEvent::Status { stage: "generating".into(), message: "composing answer".into() }).await;
        let _ = tx.send(StreamEvent::AnswerChunk { text: response.text.clone() }).await;

        if response.found {
            let _ = tx.send(StreamEvent::Evidence { items: response.evidence.clone() }).await;
            let _ = tx.send(StreamEvent::Sources { items: response.sources.clone() }).await;
        }

        let _ = tx
            .send(StreamEvent::Metadata {
                confidence: response.confidence,
                confidence_score: response.confidence_score,
                safety_flags: response.safety_flags.clone(),
                needs_human_review: response.needs_human_review,
                chunks_used: response.chunks_used,
            })
            .await;

        let _ = tx.send(StreamEvent::Done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn clarification_is_terminal_after_one_event() {
        let adapter = StreamingAdapter;
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let response = Response::clarification("which one?", vec!["A".into(), "B".into()], "AMBIGUOUS_TERM");
        adapter.emit(&response, &tx).await;
        drop(tx);

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, StreamEvent::Clarification { .. }));
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, StreamEvent::Done));
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn evidence_and_sources_precede_metadata() {
        let adapter = StreamingAdapter;
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let response = Response {
            text: "Wash hands.".into(),
            summary: "Wash hands.".into(),
            evidence: vec![],
            sources: vec![],
            chunks_used: 0,
            found: true,
            confidence: policyrag_core::ConfidenceLevel::High,
            confidence_score: 0.9,
            needs_human_review: false,
            safety_flags: vec![],
            clarification: None,
        };
        adapter.emit(&response, &tx).await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        let metadata_pos = events.iter().position(|e| matches!(e, StreamEvent::Metadata { .. })).unwrap();
        let evidence_pos = events.iter().position(|e| matches!(e, StreamEvent::Evidence { .. })).unwrap();
        let sources_pos = events.iter().position(|e| matches!(e, StreamEvent::Sources { .. })).unwrap();
        assert!(evidence_pos < metadata_pos);
        assert!(sources_pos < metadata_pos);
        assert!(matches!(events.last().unwrap(), StreamEvent::Done));
    }

    #[tokio::test]
    async fn blocked_answer_emits_single_chunk_then_metadata_then_done() {
        let adapter = StreamingAdapter;
        let (tx, mut rx) = tokio::sync::mpsc::channel(16);
        let response = Response::blocked("please consult the binder", vec!["BLOCKED_HALLUCINATION_RISK".into()]);
        adapter.emit(&response, &tx).await;
        drop(tx);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(events[1], StreamEvent::AnswerChunk { .. }));
        assert!(matches!(events[2], StreamEvent::Metadata { .. }));
        assert!(matches!(events[3], StreamEvent::Done));
        assert_eq!(events.len(), 4);
    }
}
