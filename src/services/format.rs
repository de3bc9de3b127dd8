//! Rendering of flattened feedback blobs.
//!
//! Ingestion stores each survey response as `Question: q Answer: a` units
//! joined by `"; "`. The formatter turns an ordered list of such blobs back
//! into a numbered, line-oriented presentation.

/// Separator between units inside one stored blob.
pub const UNIT_SEPARATOR: &str = "; Question: ";

const QUESTION_MARKER: &str = "Question: ";
const ANSWER_MARKER: &str = "Answer: ";

/// Render ordered feedback texts as numbered forms.
///
/// Units that do not split into exactly one question and one answer are
/// dropped without error. Empty input renders as an empty string.
pub fn format_feedback<S: AsRef<str>>(texts: &[S]) -> String {
    texts
        .iter()
        .enumerate()
        .map(|(i, text)| format_form(i + 1, text.as_ref()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn format_form(number: usize, text: &str) -> String {
    let mut block = format!("Feedback form #{}:\n\n", number);

    for (position, unit) in text.split(UNIT_SEPARATOR).enumerate() {
        // Only the first unit still carries its marker after the split
        let unit = if position == 0 {
            unit.trim_start()
                .strip_prefix(QUESTION_MARKER)
                .unwrap_or(unit)
        } else {
            unit
        };
        if unit.trim().is_empty() {
            continue;
        }

        let parts: Vec<&str> = unit.split(ANSWER_MARKER).collect();
        if let [question, answer] = parts.as_slice() {
            block.push_str(&format!(
                "Question: {}\nAnswer: {}\n\n",
                question.trim(),
                answer.trim()
            ));
        }
    }

    block.trim_end().to_string()
}
