use crate::types::{AngleSample, MotionSample, Sample};
use std::collections::VecDeque;
use thiserror::Error;

/// Line terminator of the sensor feed.
const DELIMITER: u8 = b'\n';
/// Field separator within a line.
const SEPARATOR: char = ',';
/// `roll,pitch,yaw`
const ANGLE_FIELDS: usize = 3;
/// `roll,pitch,yaw,ax,ay,az`
const MOTION_FIELDS: usize = 6;
/// Bytes held while waiting for a line terminator. A feed that never sends
/// one (wrong baud rate, binary noise) loses its oldest bytes past this.
const MAX_BUFFERED: usize = 64 * 1024;

#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("Expected 3 or 6 comma-separated fields, got {0}")]
    FieldCount(usize),
    #[error("Field {index} is not a number: {value:?}")]
    InvalidNumber { index: usize, value: String },
    #[error("Field {index} is not finite")]
    NonFinite { index: usize },
}

/// Streaming parser for the comma-separated sensor line feed.
///
/// Feed raw bytes via `push_data`, then drain parsed samples via `next_sample`.
pub struct LineParser {
    buffer: VecDeque<u8>,
}

impl LineParser {
    pub fn new() -> Self {
        Self {
            buffer: VecDeque::with_capacity(1024),
        }
    }

    /// Append received bytes to the internal buffer.
    pub fn push_data(&mut self, data: &[u8]) {
        self.buffer.extend(data);
        if self.buffer.len() > MAX_BUFFERED {
            let excess = self.buffer.len() - MAX_BUFFERED;
            self.buffer.drain(..excess);
            tracing::trace!(dropped = excess, "Line buffer full, discarding oldest bytes");
        }
    }

    /// Try to extract the next complete sample from the buffer.
    /// Returns `None` if no complete line is available yet. Blank lines are skipped.
    pub fn next_sample(&mut self) -> Option<Result<Sample, ProtocolError>> {
        loop {
            let line = self.next_line()?;
            if !line.is_empty() {
                return Some(parse_line(&line));
            }
        }
    }

    /// Drain every complete line and keep only the newest valid sample.
    pub fn latest_sample(&mut self) -> Option<Sample> {
        let mut latest = None;
        while let Some(result) = self.next_sample() {
            match result {
                Ok(sample) => latest = Some(sample),
                Err(e) => tracing::trace!(?e, "Dropping malformed line"),
            }
        }
        latest
    }

    /// Parse whatever is left in the buffer as a final, unterminated line.
    pub fn finish(&mut self) -> Option<Result<Sample, ProtocolError>> {
        if self.buffer.is_empty() {
            return None;
        }
        self.buffer.push_back(DELIMITER);
        self.next_sample()
    }

    fn next_line(&mut self) -> Option<String> {
        let end = self.buffer.iter().position(|&b| b == DELIMITER)?;
        // Serial noise can inject non-ASCII bytes; drop them rather than the line.
        let line: String = self
            .buffer
            .drain(..=end)
            .filter(u8::is_ascii)
            .map(char::from)
            .collect();
        Some(line.trim().to_owned())
    }
}

/// Parse one trimmed line into a sample.
pub fn parse_line(line: &str) -> Result<Sample, ProtocolError> {
    let fields: Vec<&str> = line.split(SEPARATOR).map(str::trim).collect();
    if fields.len() != ANGLE_FIELDS && fields.len() != MOTION_FIELDS {
        return Err(ProtocolError::FieldCount(fields.len()));
    }

    let values = fields
        .iter()
        .enumerate()
        .map(|(index, field)| {
            let value: f64 = field.parse().map_err(|_| ProtocolError::InvalidNumber {
                index,
                value: field.to_string(),
            })?;
            if value.is_finite() {
                Ok(value)
            } else {
                Err(ProtocolError::NonFinite { index })
            }
        })
        .collect::<Result<Vec<f64>, _>>()?;

    match values.as_slice() {
        &[roll, pitch, yaw] => Ok(Sample::Angles(AngleSample::new(roll, pitch, yaw))),
        &[roll, pitch, yaw, ax, ay, az] => Ok(Sample::Motion(MotionSample::new(
            AngleSample::new(roll, pitch, yaw),
            ax,
            ay,
            az,
        ))),
        other => Err(ProtocolError::FieldCount(other.len())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn angles(sample: &Sample) -> (f64, f64, f64) {
        let a = sample.angles();
        (a.roll_deg, a.pitch_deg, a.yaw_deg)
    }

    #[test]
    fn parse_angle_line() {
        let mut parser = LineParser::new();
        parser.push_data(b"1.5,-2.25,359.0\n");

        let sample = parser.next_sample().unwrap().unwrap();
        assert_eq!(angles(&sample), (1.5, -2.25, 359.0));
        assert!(sample.accel().is_none());

        // No more lines.
        assert!(parser.next_sample().is_none());
    }

    #[test]
    fn parse_motion_line_with_crlf() {
        let mut parser = LineParser::new();
        parser.push_data(b"0.00,0.00,90.00,0.01,-0.02,9.79\r\n");

        let sample = parser.next_sample().unwrap().unwrap();
        assert_eq!(angles(&sample), (0.0, 0.0, 90.0));
        let accel = sample.accel().unwrap();
        assert!((accel.x - 0.01).abs() < 1e-12);
        assert!((accel.y + 0.02).abs() < 1e-12);
        assert!((accel.z - 9.79).abs() < 1e-12);
    }

    #[test]
    fn parse_fragmented_data() {
        let line = b"10.0,20.0,30.0\n";
        let mid = line.len() / 2;

        let mut parser = LineParser::new();

        // Feed first half: no complete line yet.
        parser.push_data(&line[..mid]);
        assert!(parser.next_sample().is_none());

        // Feed second half: now we can parse.
        parser.push_data(&line[mid..]);
        let sample = parser.next_sample().unwrap().unwrap();
        assert_eq!(angles(&sample), (10.0, 20.0, 30.0));
    }

    #[test]
    fn parse_multiple_lines_skipping_blanks() {
        let mut parser = LineParser::new();
        parser.push_data(b"1,0,0\n\n   \n2,0,0\n");

        let s1 = parser.next_sample().unwrap().unwrap();
        assert_eq!(s1.angles().roll_deg, 1.0);

        let s2 = parser.next_sample().unwrap().unwrap();
        assert_eq!(s2.angles().roll_deg, 2.0);

        assert!(parser.next_sample().is_none());
    }

    #[test]
    fn malformed_lines_are_typed_errors() {
        assert_eq!(parse_line("1,2"), Err(ProtocolError::FieldCount(2)));
        assert_eq!(parse_line("1,2,3,4"), Err(ProtocolError::FieldCount(4)));
        assert_eq!(
            parse_line("1,abc,3"),
            Err(ProtocolError::InvalidNumber {
                index: 1,
                value: "abc".into()
            })
        );
        assert_eq!(parse_line("1,2,inf"), Err(ProtocolError::NonFinite { index: 2 }));
        assert_eq!(
            parse_line("IMU init failed... retrying"),
            Err(ProtocolError::FieldCount(1))
        );
    }

    #[test]
    fn non_ascii_bytes_are_dropped() {
        let mut parser = LineParser::new();
        parser.push_data(&[b'4', 0xC3, b',', b'5', b',', 0xFF, b'6', b'\n']);

        let sample = parser.next_sample().unwrap().unwrap();
        assert_eq!(angles(&sample), (4.0, 5.0, 6.0));
    }

    #[test]
    fn latest_sample_keeps_newest_valid_line() {
        let mut parser = LineParser::new();
        parser.push_data(b"1,0,0\n2,0,0\ngarbage\n3,0,0,0,0,9.81\n4,0");

        let sample = parser.latest_sample().unwrap();
        assert_eq!(sample.angles().roll_deg, 3.0);
        assert!(sample.accel().is_some());

        // The partial line stays buffered until its terminator arrives.
        assert!(parser.latest_sample().is_none());
        parser.push_data(b",0\n");
        assert_eq!(parser.latest_sample().unwrap().angles().roll_deg, 4.0);
    }

    #[test]
    fn finish_parses_unterminated_tail() {
        let mut parser = LineParser::new();
        parser.push_data(b"7,8,9");
        assert!(parser.next_sample().is_none());

        let sample = parser.finish().unwrap().unwrap();
        assert_eq!(angles(&sample), (7.0, 8.0, 9.0));
        assert!(parser.finish().is_none());
    }

    #[test]
    fn unterminated_noise_is_bounded() {
        let mut parser = LineParser::new();
        for _ in 0..100 {
            parser.push_data(&[b'x'; 1024]);
        }
        assert_eq!(parser.buffer.len(), MAX_BUFFERED);
        assert!(parser.next_sample().is_none());

        parser.push_data(b"
1,2,3
");
        assert_eq!(parser.next_sample(), Some(Err(ProtocolError::FieldCount(1))));
        let sample = parser.next_sample().unwrap().unwrap();
        assert_eq!(angles(&sample), (1.0, 2.0, 3.0));
    }
}
