/// Split `text` into pieces of at most `size` bytes without breaking a UTF-8
/// sequence. Concatenating the pieces yields `text` again.
///
/// A `size` of zero is treated as one. A single character wider than `size`
/// gets a piece of its own.
pub fn chunk_text(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(1);
    let mut chunks = Vec::with_capacity(text.len() / size + 1);
    let mut rest = text;

    while !rest.is_empty() {
        let mut end = size.min(rest.len());
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        if end == 0 {
            end = rest.chars().next().map_or(rest.len(), char::len_utf8);
        }
        let (head, tail) = rest.split_at(end);
        chunks.push(head);
        rest = tail;
    }

    chunks
}
