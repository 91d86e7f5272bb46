// SPDX-License-Identifier: MIT

//! Token: a marker identifying a position in a process instance's graph (§3).

use crate::id::{ActivationId, ProcessInstanceId, ScopeId, TokenId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::variable::VariableValue;

/// A token's small private data bag, carried across a split and merged
/// last-writer-wins at a join (§4.1 Parallel Gateway).
pub type TokenData = HashMap<String, VariableValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub instance_id: ProcessInstanceId,
    pub node_id: String,
    pub scope_id: ScopeId,
    #[serde(default)]
    pub data: TokenData,
    /// Set for tokens produced by a parallel/inclusive split join, linking
    /// siblings that must all arrive before the join fires.
    pub parent_token_id: Option<TokenId>,
    /// Identifies which split activation produced this token. Joins only
    /// match tokens sharing their parent's activation id, so a split
    /// re-entered inside a loop starts a fresh set of arrivals (§9).
    pub activation_id: Option<ActivationId>,
    /// Wall-clock write time, used as the first tie-break for last-writer-wins
    /// merges at a parallel join (§4.1).
    pub written_at: chrono::DateTime<chrono::Utc>,
}

impl Token {
    pub fn new(instance_id: ProcessInstanceId, node_id: impl Into<String>) -> Self {
        Self {
            id: TokenId::new(),
            instance_id,
            node_id: node_id.into(),
            scope_id: None,
            data: TokenData::new(),
            parent_token_id: None,
            activation_id: None,
            written_at: chrono::Utc::now(),
        }
    }

    /// The (instance, node, scope) identity used to enforce invariant 1 (§3):
    /// at most one token per path, except for parallel multi-instance nodes
    /// which carve out distinct scopes per branch.
    pub fn path_key(&self) -> (ProcessInstanceId, &str, &ScopeId) {
        (self.instance_id, self.node_id.as_str(), &self.scope_id)
    }

    /// Produce a sibling token at `node_id` carrying a copy of this token's
    /// data and the same parent/activation linkage, used by parallel and
    /// inclusive splits (§4.1).
    pub fn fork_to(&self, node_id: impl Into<String>, activation: ActivationId) -> Self {
        Self {
            id: TokenId::new(),
            instance_id: self.instance_id,
            node_id: node_id.into(),
            scope_id: self.scope_id.clone(),
            data: self.data.clone(),
            parent_token_id: Some(self.id),
            activation_id: Some(activation),
            written_at: chrono::Utc::now(),
        }
    }

    /// Merge this token's data with `others`, resolving key conflicts by
    /// last-writer-wins: later `written_at`, then higher token id (§4.1).
    pub fn merge_data(mut tokens: Vec<Token>) -> TokenData {
        tokens.sort_by(|a, b| a.written_at.cmp(&b.written_at).then(a.id.cmp(&b.id)));
        let mut merged = TokenData::new();
        for token in tokens {
            for (k, v) in token.data {
                merged.insert(k, v);
            }
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_at(node: &str) -> Token {
        Token::new(ProcessInstanceId::new(), node)
    }

    #[test]
    fn merge_data_is_last_writer_wins_by_wall_clock() {
        let mut earlier = token_at("join");
        earlier.data.insert("x".into(), VariableValue::Integer(1));
        earlier.written_at = chrono::Utc::now();

        let mut later = token_at("join");
        later.data.insert("x".into(), VariableValue::Integer(2));
        later.written_at = earlier.written_at + chrono::Duration::seconds(1);

        let merged = Token::merge_data(vec![earlier, later]);
        assert_eq!(merged.get("x"), Some(&VariableValue::Integer(2)));
    }

    #[test]
    fn merge_data_ties_break_on_token_id() {
        let now = chrono::Utc::now();
        let mut a = token_at("join");
        a.written_at = now;
        a.data.insert("x".into(), VariableValue::Integer(1));
        let mut b = token_at("join");
        b.written_at = now;
        b.data.insert("x".into(), VariableValue::Integer(2));

        let winner = if a.id > b.id { 1 } else { 2 };
        let merged = Token::merge_data(vec![a, b]);
        assert_eq!(merged.get("x"), Some(&VariableValue::Integer(winner)));
    }
}
