use crate::id::CorrelationId;
use crate::wire::{DELIMITER, HANDSHAKE_MARKER, PACKET_LENGTH, SIZE_ERROR_MARKER, STOP_COMMAND};

/// What one delimited sub-frame means.
///
/// Variants are tested in declaration order; the first match wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubFrame<'a> {
    /// Controller is ready. Only recognized before the link is initialized.
    Handshake,
    /// Controller rejected a command packet's size.
    SizeError,
    /// Stop transmitting until the next acknowledgment.
    Stop,
    /// Plain acknowledgment of a command.
    Ack(CorrelationId),
    /// Event packet followed by the correlation id suffix of the command it answers.
    Response { event: &'a [u8], suffix: &'a [u8] },
    /// Unsolicited event packet.
    Event(&'a [u8]),
    /// Matches nothing above.
    Unexpected(&'a [u8]),
}

/// Split one physical read into its `\r\n`-delimited sub-frames.
///
/// Empty pieces (leading, trailing or doubled delimiters) are skipped.
pub fn split_subframes(buf: &[u8]) -> SubFrames<'_> {
    SubFrames { rest: Some(buf) }
}

/// Iterator returned by [`split_subframes`].
#[derive(Debug, Clone)]
pub struct SubFrames<'a> {
    rest: Option<&'a [u8]>,
}

impl<'a> Iterator for SubFrames<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<&'a [u8]> {
        loop {
            let rest = self.rest?;
            let piece = match find_delimiter(rest) {
                Some(at) => {
                    self.rest = Some(&rest[at + DELIMITER.len()..]);
                    &rest[..at]
                }
                None => {
                    self.rest = None;
                    rest
                }
            };
            if !piece.is_empty() {
                return Some(piece);
            }
        }
    }
}

fn find_delimiter(buf: &[u8]) -> Option<usize> {
    buf.windows(DELIMITER.len()).position(|w| w == DELIMITER)
}

/// Classify one sub-frame.
///
/// `initialized` is whether a handshake has already been seen; afterwards the marker
/// no longer has special meaning.
pub fn classify(sub_frame: &[u8], initialized: bool) -> SubFrame<'_> {
    let text = std::str::from_utf8(sub_frame).ok();

    if !initialized && text == Some(HANDSHAKE_MARKER) {
        return SubFrame::Handshake;
    }
    if text == Some(SIZE_ERROR_MARKER) {
        return SubFrame::SizeError;
    }
    if text == Some(STOP_COMMAND) {
        return SubFrame::Stop;
    }
    if text.is_some() {
        if let Some(id) = CorrelationId::from_ascii(sub_frame) {
            return SubFrame::Ack(id);
        }
    }

    match sub_frame.len() {
        len if len > PACKET_LENGTH => {
            let (event, suffix) = sub_frame.split_at(PACKET_LENGTH);
            SubFrame::Response { event, suffix }
        }
        PACKET_LENGTH => SubFrame::Event(sub_frame),
        _ => SubFrame::Unexpected(sub_frame),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_crlf() {
        let parts: Vec<&[u8]> = split_subframes(b"Stop\r\n1234\r\nabc").collect();
        assert_eq!(parts, vec![&b"Stop"[..], &b"1234"[..], &b"abc"[..]]);
    }

    #[test]
    fn split_skips_empty_pieces() {
        let parts: Vec<&[u8]> = split_subframes(b"\r\nStop\r\n\r\n").collect();
        assert_eq!(parts, vec![&b"Stop"[..]]);
        assert_eq!(split_subframes(b"").count(), 0);
    }

    #[test]
    fn lone_cr_or_lf_is_not_a_delimiter() {
        let parts: Vec<&[u8]> = split_subframes(b"a\rb\nc").collect();
        assert_eq!(parts, vec![&b"a\rb\nc"[..]]);
    }

    #[test]
    fn handshake_only_before_initialization() {
        assert_eq!(classify(b"Transmission Start", false), SubFrame::Handshake);
        assert_ne!(classify(b"Transmission Start", true), SubFrame::Handshake);
    }

    #[test]
    fn text_control_lines() {
        assert_eq!(classify(b"Invalid data size", false), SubFrame::SizeError);
        assert_eq!(classify(b"Stop", true), SubFrame::Stop);
        assert_eq!(
            classify(b"4821", true),
            SubFrame::Ack(CorrelationId::new(4821).unwrap())
        );
    }

    #[test]
    fn near_miss_text_is_unexpected() {
        assert_eq!(classify(b"stop", true), SubFrame::Unexpected(b"stop"));
        assert_eq!(classify(b"482", true), SubFrame::Unexpected(b"482"));
        assert_eq!(classify(b"48a1", true), SubFrame::Unexpected(b"48a1"));
    }

    #[test]
    fn exact_length_binary_is_event() {
        let frame = [0x15u8, 0, 0, 0, 0x80, 0x3f, 0, 0, 0, 0, 0, 0, 0, 0xff];
        assert_eq!(classify(&frame, true), SubFrame::Event(&frame[..]));
    }

    #[test]
    fn oversized_binary_is_response_with_suffix() {
        let mut frame = vec![0x15u8; PACKET_LENGTH];
        frame.extend_from_slice(&[4, 8, 2, 1]);
        match classify(&frame, true) {
            SubFrame::Response { event, suffix } => {
                assert_eq!(event.len(), PACKET_LENGTH);
                assert_eq!(suffix, &[4, 8, 2, 1]);
            }
            other => panic!("expected response, got {other:?}"),
        }
    }

    #[test]
    fn short_binary_is_unexpected() {
        let frame = [0xffu8, 0xfe, 0x00];
        assert_eq!(classify(&frame, true), SubFrame::Unexpected(&frame[..]));
    }

    #[test]
    fn repeated_handshake_after_init_is_ordinary_data() {
        // Longer than PACKET_LENGTH, so it lands in the response branch.
        assert!(matches!(
            classify(b"Transmission Start", true),
            SubFrame::Response { .. }
        ));
    }
}
