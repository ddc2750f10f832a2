/// Side effects requested by [`super::reduce`] for the runtime to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Append a markdown fragment to the turn's output.
    Emit(String),

    /// First thread id seen this turn for a session that had none.
    CaptureThreadId(String),

    /// Stop reading the reasoning stream, then relay the explanation stream
    /// for this query id.
    OpenExplanation(String),

    /// Stop reading the reasoning stream, then fetch an explanation with a
    /// one-shot ask call.
    FallbackExplain,

    /// The reasoning stream has nothing more to contribute.
    Finish,
}
