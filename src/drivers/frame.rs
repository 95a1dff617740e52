use std::collections::VecDeque;
use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use crate::drivers::error::FrameError;
use crate::types::Sample;
/// How raw lines are grouped into candidate frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FramingPolicy {
    /// One line is one frame; a line with the wrong token count is dropped whole.
    Line,
    /// Tokens from successive lines are pooled and regrouped in fixed-size chunks.
    ///
    /// Recovers frames split across reads, but a single lost token shifts every
    /// later channel assignment. The wire format has no sync marker, so this
    /// misalignment is kept as-is rather than guessed around.
    TokenAccumulating,
}
/// Token shape of one frame on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameLayout {
    pub tokens_per_frame: usize,
    pub leading_index: bool,
}
impl FrameLayout {
    pub fn new(tokens_per_frame: usize, leading_index: bool) -> Self {
        Self {
            tokens_per_frame,
            leading_index,
        }
    }
    pub fn num_channels(&self) -> usize {
        if self.leading_index {
            self.tokens_per_frame.saturating_sub(1)
        } else {
            self.tokens_per_frame
        }
    }
    /// Converts exactly one frame worth of tokens into a sample.
    pub fn parse_tokens<S: AsRef<str>>(&self, tokens: &[S]) -> Result<Sample, FrameError> {
        if tokens.len() != self.tokens_per_frame {
            return Err(FrameError::TokenCount {
                expected: self.tokens_per_frame,
                actual: tokens.len(),
            });
        }
        let mut numbers = Vec::with_capacity(tokens.len());
        for token in tokens {
            let token = token.as_ref();
            let value = token
                .parse::<f64>()
                .map_err(|_| FrameError::InvalidNumber {
                    token: token.to_string(),
                })?;
            numbers.push(value);
        }
        if self.leading_index {
            let index = numbers.remove(0);
            Ok(Sample::with_index(index, numbers))
        } else {
            Ok(Sample::new(numbers))
        }
    }
}
/// Result of feeding one line: zero or more samples plus the frames that were rejected.
#[derive(Debug, Default, PartialEq)]
pub struct ParseOutcome {
    pub samples: Vec<Sample>,
    pub rejected: Vec<FrameError>,
}
/// Turns raw text lines into samples under one framing policy.
pub struct FrameParser {
    layout: FrameLayout,
    policy: FramingPolicy,
    backlog: VecDeque<String>,
}
impl FrameParser {
    pub fn new(layout: FrameLayout, policy: FramingPolicy) -> Self {
        Self {
            layout,
            policy,
            backlog: VecDeque::with_capacity(layout.tokens_per_frame * 2),
        }
    }
    pub fn layout(&self) -> FrameLayout {
        self.layout
    }
    /// Tokens waiting for the rest of their frame.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }
    pub fn reset(&mut self) {
        if !self.backlog.is_empty() {
            debug!("discarding {} backlog tokens", self.backlog.len());
        }
        self.backlog.clear();
    }
    pub fn feed_line(&mut self, line: &str) -> ParseOutcome {
        let line = line.trim();
        if line.is_empty() {
            return ParseOutcome::default();
        }
        match self.policy {
            FramingPolicy::Line => self.parse_line(line),
            FramingPolicy::TokenAccumulating => {
                self.backlog
                    .extend(line.split_whitespace().map(str::to_owned));
                self.drain_backlog()
            }
        }
    }
    fn parse_line(&self, line: &str) -> ParseOutcome {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let mut outcome = ParseOutcome::default();
        match self.layout.parse_tokens(&tokens) {
            Ok(sample) => outcome.samples.push(sample),
            Err(err) => {
                warn!("dropping frame {line:?}: {err}");
                outcome.rejected.push(err);
            }
        }
        outcome
    }
    fn drain_backlog(&mut self) -> ParseOutcome {
        let mut outcome = ParseOutcome::default();
        let n = self.layout.tokens_per_frame;
        if n == 0 {
            self.backlog.clear();
            return outcome;
        }
        while self.backlog.len() >= n {
            let group: Vec<String> = self.backlog.drain(..n).collect();
            match self.layout.parse_tokens(&group) {
                Ok(sample) => {
                    trace!("parsed sample {:?}", sample.values());
                    outcome.samples.push(sample);
                }
                Err(err) => {
                    warn!("dropping token group {group:?}: {err}");
                    outcome.rejected.push(err);
                }
            }
        }
        outcome
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    fn accumulating(n: usize) -> FrameParser {
        FrameParser::new(FrameLayout::new(n, false), FramingPolicy::TokenAccumulating)
    }
    #[test]
    fn split_tokens_rejoin_into_one_sample() {
        let mut parser = accumulating(3);
        let first = parser.feed_line("0.1");
        assert!(first.samples.is_empty());
        assert_eq!(parser.backlog_len(), 1);
        let second = parser.feed_line("2.2 3.3");
        assert_eq!(second.samples, vec![Sample::new(vec![0.1, 2.2, 3.3])]);
        assert_eq!(parser.backlog_len(), 0);
        let mut whole = accumulating(3);
        assert_eq!(whole.feed_line("0.1 2.2 3.3").samples, second.samples);
    }
    #[test]
    fn backlog_stays_below_frame_size_after_drain() {
        let mut parser = accumulating(4);
        let outcome = parser.feed_line("1 2 3 4 5 6 7 8 9 10");
        assert_eq!(outcome.samples.len(), 2);
        assert_eq!(parser.backlog_len(), 2);
        let outcome = parser.feed_line("11 12");
        assert_eq!(outcome.samples, vec![Sample::new(vec![9.0, 10.0, 11.0, 12.0])]);
        assert_eq!(parser.backlog_len(), 0);
    }
    #[test]
    fn line_framing_drops_short_line_and_recovers() {
        let mut parser = FrameParser::new(FrameLayout::new(3, false), FramingPolicy::Line);
        let bad = parser.feed_line("1.0 2.0");
        assert!(bad.samples.is_empty());
        assert_eq!(
            bad.rejected,
            vec![FrameError::TokenCount {
                expected: 3,
                actual: 2
            }]
        );
        assert_eq!(parser.backlog_len(), 0);
        let good = parser.feed_line("4.0 5.0 6.0");
        assert_eq!(good.samples, vec![Sample::new(vec![4.0, 5.0, 6.0])]);
    }
    #[test]
    fn non_numeric_token_drops_only_its_frame() {
        let mut parser = FrameParser::new(FrameLayout::new(3, false), FramingPolicy::Line);
        let bad = parser.feed_line("1.0 abc 3.0");
        assert!(bad.samples.is_empty());
        assert_eq!(
            bad.rejected,
            vec![FrameError::InvalidNumber {
                token: "abc".into()
            }]
        );
        let good = parser.feed_line("7 8 9");
        assert_eq!(good.samples.len(), 1);

        let mut parser = accumulating(3);
        let outcome = parser.feed_line("1 abc 3 4 5 6");
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.samples, vec![Sample::new(vec![4.0, 5.0, 6.0])]);
    }
    #[test]
    fn lost_token_misaligns_accumulating_stream() {
        // A frame missing one token shifts every following group by one position.
        let mut parser = accumulating(3);
        let outcome = parser.feed_line("1 2");
        assert!(outcome.samples.is_empty());
        let outcome = parser.feed_line("10 20 30");
        assert_eq!(outcome.samples, vec![Sample::new(vec![1.0, 2.0, 10.0])]);
        assert_eq!(parser.backlog_len(), 2);
    }
    #[test]
    fn leading_index_is_split_from_channels() {
        let mut parser = FrameParser::new(FrameLayout::new(4, true), FramingPolicy::Line);
        let outcome = parser.feed_line("  17 0.5 1.5 2.5\r\n");
        let sample = &outcome.samples[0];
        assert_eq!(sample.index(), Some(17.0));
        assert_eq!(sample.values(), &[0.5, 1.5, 2.5]);
        assert_eq!(parser.layout().num_channels(), 3);
    }
    #[test]
    fn blank_lines_are_ignored() {
        let mut parser = accumulating(3);
        assert_eq!(parser.feed_line("   "), ParseOutcome::default());
        parser.feed_line("1");
        parser.reset();
        assert_eq!(parser.backlog_len(), 0);
    }
}
