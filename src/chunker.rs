/// What to do with a single sentence that is longer than `max_len` on its
/// own. Earlier revisions of the bot disagreed on this, so it is an
/// explicit policy instead of a hard-coded choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OversizePolicy {
    /// Emit the sentence whole, exceeding `max_len`.
    Emit,
    /// Cut the sentence to `max_len` characters, ending with `…`.
    Truncate,
}

const TRUNCATION_MARKER: char = '…';

/// Splits an oversized reply into transport-safe, sentence-aligned
/// fragments.
///
/// Sentences are the pieces between `". "` delimiters; they are greedily
/// packed into fragments of at most `max_len` characters. Joining the
/// returned fragments with single spaces reproduces the input exactly,
/// except when [`OversizePolicy::Truncate`] cuts an oversized sentence.
pub struct MessageChunker {
    max_len: usize,
    oversize: OversizePolicy,
}

impl MessageChunker {
    pub fn new(max_len: usize, oversize: OversizePolicy) -> Self {
        Self { max_len, oversize }
    }

    /// Split `text` into fragments. Returns no fragments for empty input,
    /// at least one otherwise. Fragment lengths are counted in `char`s.
    pub fn split(&self, text: &str) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        if text.chars().count() <= self.max_len {
            return vec![text.to_string()];
        }

        // Re-append the period the delimiter split consumed; the joining
        // space is re-inserted while packing.
        let mut sentences: Vec<String> =
            text.split(". ").map(|s| format!("{s}.")).collect();
        if let Some(last) = sentences.last_mut() {
            last.pop();
        }

        let mut fragments = Vec::new();
        let mut buf = String::new();
        for sentence in sentences {
            let sentence_len = sentence.chars().count();
            if buf.is_empty() {
                if sentence_len > self.max_len {
                    fragments.push(self.oversized(sentence));
                } else {
                    buf = sentence;
                }
                continue;
            }
            if buf.chars().count() + 1 + sentence_len > self.max_len {
                fragments.push(std::mem::take(&mut buf));
                if sentence_len > self.max_len {
                    fragments.push(self.oversized(sentence));
                } else {
                    buf = sentence;
                }
            } else {
                buf.push(' ');
                buf.push_str(&sentence);
            }
        }
        if !buf.is_empty() {
            fragments.push(buf);
        }
        fragments
    }

    fn oversized(&self, sentence: String) -> String {
        match self.oversize {
            OversizePolicy::Emit => sentence,
            OversizePolicy::Truncate => {
                let mut cut: String =
                    sentence.chars().take(self.max_len.saturating_sub(1)).collect();
                cut.push(TRUNCATION_MARKER);
                cut
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunker(max_len: usize) -> MessageChunker {
        MessageChunker::new(max_len, OversizePolicy::Emit)
    }

    #[test]
    fn short_text_is_one_fragment() {
        assert_eq!(chunker(10).split("hi there"), vec!["hi there"]);
        assert_eq!(chunker(8).split("hi there"), vec!["hi there"]);
    }

    #[test]
    fn empty_text_yields_no_fragments() {
        assert!(chunker(10).split("").is_empty());
    }

    #[test]
    fn splits_on_sentence_boundaries() {
        assert_eq!(chunker(3).split("A. B. C."), vec!["A.", "B.", "C."]);
    }

    #[test]
    fn packs_sentences_greedily() {
        let text = "One two. Three four. Five six seven eight.";
        assert_eq!(
            chunker(20).split(text),
            vec!["One two. Three four.", "Five six seven eight."]
        );
    }

    #[test]
    fn rejoining_fragments_reproduces_the_input() {
        let text = "First sentence here. Second one. Third is a bit longer. Fourth. \
                    Fifth closes it";
        let fragments = chunker(30).split(text);
        assert!(fragments.len() > 1);
        for fragment in &fragments {
            assert!(fragment.chars().count() <= 30, "oversized fragment: {fragment:?}");
        }
        assert_eq!(fragments.join(" "), text);
    }

    #[test]
    fn oversized_sentence_is_emitted_whole_by_default() {
        let text = "Short one. Thisisasinglewordthatrunsverylong. Tail.";
        let fragments = chunker(12).split(text);
        assert_eq!(
            fragments,
            vec!["Short one.", "Thisisasinglewordthatrunsverylong.", "Tail."]
        );
    }

    #[test]
    fn oversized_sentence_is_cut_under_truncate_policy() {
        let splitter = MessageChunker::new(12, OversizePolicy::Truncate);
        let text = "Short one. Thisisasinglewordthatrunsverylong. Tail.";
        let fragments = splitter.split(text);
        assert_eq!(fragments, vec!["Short one.", "Thisisasing…", "Tail."]);
    }

    #[test]
    fn text_without_delimiter_is_a_single_fragment() {
        let text = "no sentence delimiter in here at all";
        assert_eq!(chunker(10).split(text), vec![text]);
    }

    #[test]
    fn lengths_are_counted_in_chars_not_bytes() {
        let text = "ééééé. ooooo.";
        assert_eq!(chunker(6).split(text), vec!["ééééé.", "ooooo."]);
    }
}
