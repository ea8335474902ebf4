use std::collections::BTreeMap;

use shared::domain::{Citation, CitationId};
use tracing::warn;

use crate::types::MessageId;

/// Citation lookup for the answer currently on screen.
///
/// Citation ids restart at 1 for every answer, so the index only ever serves
/// one message. Moving the scope to another message forgets the previous
/// citations; looking up an id from an older answer afterwards simply finds
/// whatever the new answer numbered that way, or nothing.
#[derive(Debug, Clone, Default)]
pub struct CitationIndex {
    scope: Option<MessageId>,
    citations: BTreeMap<CitationId, Citation>,
}

impl CitationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scope(&self) -> Option<MessageId> {
        self.scope
    }

    pub fn scope_to(&mut self, message_id: MessageId) {
        self.scope = Some(message_id);
        self.citations.clear();
    }

    pub fn attach(&mut self, message_id: MessageId, citations: &[Citation]) {
        if self.scope != Some(message_id) {
            self.scope_to(message_id);
        }
        for citation in citations {
            if self.citations.contains_key(&citation.citation_id) {
                warn!(
                    message_id = message_id.0,
                    citation_id = citation.citation_id.0,
                    "duplicate citation id in one answer; keeping the first"
                );
                continue;
            }
            self.citations
                .insert(citation.citation_id, citation.clone());
        }
    }

    pub fn resolve(&self, citation_id: CitationId) -> Option<&Citation> {
        self.citations.get(&citation_id)
    }

    /// Citations in id order.
    pub fn citations(&self) -> impl Iterator<Item = &Citation> {
        self.citations.values()
    }

    pub fn len(&self) -> usize {
        self.citations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }

    pub fn clear(&mut self) {
        self.scope = None;
        self.citations.clear();
    }
}

#[cfg(test)]
#[path = "tests/citations_tests.rs"]
mod tests;
