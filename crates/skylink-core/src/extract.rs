/// Returns the text between the first `{` and the last `}` of a line.
///
/// This is a compatibility heuristic for the drone firmware, which may prefix
/// frames with radio noise or log tags. It does not balance braces, so two
/// objects on one line come back as one (unparseable) span.
pub fn extract_object(line: &str) -> Option<&str> {
    let start = line.find('{')?;
    let end = line.rfind('}')?;
    (end > start).then(|| &line[start..=end])
}
