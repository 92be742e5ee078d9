use crate::report::Report;

/// Nudge the pointer `width` steps right and `width` steps back, so it ends
/// up where it started. Ends with an end record, `2 * width + 1` in all.
pub fn mouse_jiggler(width: usize) -> Vec<Report> {
    let mut out = Vec::with_capacity(2 * width + 1);
    out.extend(std::iter::repeat(Report::mouse_move(1, 0)).take(width));
    out.extend(std::iter::repeat(Report::mouse_move(-1, 0)).take(width));
    out.push(Report::End);
    out
}
