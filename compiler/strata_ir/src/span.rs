//! Source spans.

/// A half-open byte range into the source a node came from.
///
/// The planner only threads spans through rewrites; nodes it synthesizes
/// (annotations, copies) carry [`Span::DUMMY`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// The span for synthesized nodes.
    pub const DUMMY: Span = Span { start: 0, end: 0 };

    pub fn new(start: u32, end: u32) -> Self {
        Span { start, end }
    }
}
