use crate::MAX_STACK_DEPTH;

/// Errors that abort a parse.
///
/// Stray closing tags, unknown tags and malformed links are not errors: they
/// show up in the output as escaped literal text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DTextError {
    #[error("too many nested elements (limit is {limit})")]
    TooDeep { limit: usize },
}

impl DTextError {
    pub(crate) fn too_deep() -> Self {
        DTextError::TooDeep {
            limit: MAX_STACK_DEPTH,
        }
    }
}
