// SPDX-License-Identifier: MIT

//! Identity types for the execution engine's data model (§3).
//!
//! All identities are UUIDs per the spec's data model; scopes are plain
//! strings identifying a subprocess path rather than a generated id.

crate::uuid_id! {
    /// Identity of an immutable process definition (BPMN source + version).
    pub struct ProcessDefinitionId;
}

crate::uuid_id! {
    /// Identity of a running (or completed) process instance.
    pub struct ProcessInstanceId;
}

crate::uuid_id! {
    /// Identity of a token, the marker of a position in the process graph.
    pub struct TokenId;
}

crate::uuid_id! {
    /// Identity of a variable row (one per append; not a stable row key).
    pub struct VariableId;
}

crate::uuid_id! {
    /// Identity of a persisted timer record.
    pub struct TimerRecordId;
}

/// A scope identifies a subprocess path that nests variable visibility and
/// disambiguates otherwise-identical (instance, node) token positions for
/// parallel multi-instance branches. `None` means the top-level process scope.
pub type ScopeId = Option<smol_str::SmolStr>;

/// Identity of a single parallel/inclusive split activation, carried on the
/// tokens it spawns so that a re-entered split (inside a loop) produces a
/// join that only matches tokens from its own activation (§9 Open Questions).
crate::uuid_id! {
    pub struct ActivationId;
}
