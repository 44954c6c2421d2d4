//! # Device Link
//!
//! The boundary to the sampling board: frames come in as signed bytes,
//! single-byte commands go out. [`SerialLink`] speaks the firmware protocol
//! over any byte stream; [`ReplayLink`] plays back a raw capture file.

use std::io::{BufRead, ErrorKind, Read, Write};

use crate::command::Command;
use crate::error::LinkError;

/// Produces sample frames and accepts commands.
pub trait DeviceLink {
    /// Samples per frame the device is currently sending.
    fn frame_len(&self) -> usize;

    /// Sample rate in Hz the device is currently using.
    fn sample_rate(&self) -> u32;

    /// Blocks until one full frame has arrived.
    fn read_frame(&mut self) -> Result<Vec<i8>, LinkError>;

    /// Sends one command and checks it was acknowledged.
    fn send_command(&mut self, command: Command) -> Result<(), LinkError>;
}

/// Keeps the link's view of the stream format in step with format commands.
fn track_format(command: Command, frame_len: &mut usize, sample_rate: &mut u32) {
    match command {
        Command::SampleRate(rate) => *sample_rate = rate.hz(),
        Command::FrameLength(len) => *frame_len = len.samples(),
        _ => {}
    }
}

/// Reads exactly `len` bytes, distinguishing a clean end of stream from a
/// frame cut short. A read timeout ends the frame early but never closes
/// the link.
fn read_exact_frame<R: Read>(reader: &mut R, len: usize) -> Result<Vec<i8>, LinkError> {
    let mut buffer = vec![0u8; len];
    let mut filled = 0;
    let mut timed_out = false;
    while filled < len {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                timed_out = true;
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    match filled {
        0 if !timed_out => Err(LinkError::Closed),
        n if n < len => Err(LinkError::ShortFrame { expected: len, actual: n }),
        _ => Ok(buffer.into_iter().map(|b| b as i8).collect()),
    }
}

/// Firmware protocol over a line-oriented reader and a writer.
///
/// # Handshake
/// On connect the board prints a line containing `Setup Complete`, then one
/// line ending in `: <frame length>` and one ending in `: <sample rate>`.
#[derive(Debug)]
pub struct SerialLink<R, W> {
    reader: R,
    writer: W,
    frame_len: usize,
    sample_rate: u32,
}

impl<R: BufRead, W: Write> SerialLink<R, W> {
    /// Performs the start-up handshake.
    pub fn connect(mut reader: R, writer: W) -> Result<Self, LinkError> {
        let banner = read_line(&mut reader)?;
        if !banner.contains("Setup Complete") {
            return Err(LinkError::Handshake(format!(
                "unable to complete setup, received {banner:?}"
            )));
        }

        let frame_len: usize = parse_field(&read_line(&mut reader)?)?;
        let sample_rate: u32 = parse_field(&read_line(&mut reader)?)?;
        if frame_len == 0 || sample_rate == 0 {
            return Err(LinkError::Handshake(format!(
                "device reported {frame_len} samples @ {sample_rate} Hz"
            )));
        }
        log::info!("Device ready: {} samples per frame @ {} Hz", frame_len, sample_rate);

        Ok(Self {
            reader,
            writer,
            frame_len,
            sample_rate,
        })
    }

    pub fn into_parts(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

impl<R: BufRead, W: Write> DeviceLink for SerialLink<R, W> {
    fn frame_len(&self) -> usize {
        self.frame_len
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&mut self) -> Result<Vec<i8>, LinkError> {
        read_exact_frame(&mut self.reader, self.frame_len)
    }

    fn send_command(&mut self, command: Command) -> Result<(), LinkError> {
        let code = command.code();
        self.writer.write_all(&[code])?;
        self.writer.flush()?;
        log::info!("Command sent: {} ({})", command, code as char);

        let reply = read_line(&mut self.reader)?;
        log::debug!("Device response: {:?}", reply);
        if !echoes(&reply, code) {
            return Err(LinkError::NotAcknowledged {
                code: code as char,
                reply,
            });
        }

        // The firmware follows a letter-coded echo with a spurious
        // "Command Not Found" line.
        if code.is_ascii_alphabetic() {
            let trailer = read_line(&mut self.reader)?;
            log::debug!("Discarding trailing response: {:?}", trailer);
        }

        track_format(command, &mut self.frame_len, &mut self.sample_rate);
        Ok(())
    }
}

fn read_line<R: BufRead>(reader: &mut R) -> Result<String, LinkError> {
    let mut raw = Vec::new();
    if reader.read_until(b'\n', &mut raw)? == 0 {
        return Err(LinkError::Closed);
    }
    Ok(String::from_utf8_lossy(&raw).trim_end().to_string())
}

/// True when `reply` is `<label>: <code>`.
fn echoes(reply: &str, code: u8) -> bool {
    match reply.rsplit_once(':') {
        Some((_, value)) => value.trim().as_bytes() == [code],
        None => false,
    }
}

fn parse_field<T: std::str::FromStr>(line: &str) -> Result<T, LinkError> {
    line.rsplit(':')
        .next()
        .map(str::trim)
        .and_then(|value| value.parse().ok())
        .ok_or_else(|| LinkError::Handshake(format!("malformed setup line {line:?}")))
}

/// Plays back a headerless capture of signed-byte frames.
///
/// Commands are acknowledged locally; format commands change how the
/// following frames are sliced.
#[derive(Debug)]
pub struct ReplayLink<R> {
    source: R,
    frame_len: usize,
    sample_rate: u32,
    sent: Vec<Command>,
}

impl<R: Read> ReplayLink<R> {
    pub fn new(source: R, frame_len: usize, sample_rate: u32) -> Self {
        Self {
            source,
            frame_len,
            sample_rate,
            sent: Vec::new(),
        }
    }

    /// Commands received so far, oldest first.
    pub fn sent_commands(&self) -> &[Command] {
        &self.sent
    }
}

impl<R: Read> DeviceLink for ReplayLink<R> {
    fn frame_len(&self) -> usize {
        self.frame_len
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn read_frame(&mut self) -> Result<Vec<i8>, LinkError> {
        read_exact_frame(&mut self.source, self.frame_len)
    }

    fn send_command(&mut self, command: Command) -> Result<(), LinkError> {
        log::debug!("Replay command: {}", command);
        track_format(command, &mut self.frame_len, &mut self.sample_rate);
        self.sent.push(command);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{FrameLength, Led, SampleRate};
    use std::io::Cursor;

    fn banner(frame_len: usize, sample_rate: u32) -> Vec<u8> {
        format!("Setup Complete\r\nSample no: {frame_len}\r\nSample freq: {sample_rate}\r\n").into_bytes()
    }

    #[test]
    fn handshake_reads_stream_format() {
        let link = SerialLink::connect(Cursor::new(banner(1024, 4000)), Vec::new()).unwrap();
        assert_eq!(link.frame_len(), 1024);
        assert_eq!(link.sample_rate(), 4000);
    }

    #[test]
    fn handshake_rejects_missing_banner() {
        let input = Cursor::new(b"garbage\nSample no: 256\n".to_vec());
        assert!(matches!(
            SerialLink::connect(input, Vec::new()),
            Err(LinkError::Handshake(_))
        ));
    }

    #[test]
    fn handshake_rejects_malformed_numbers() {
        let input = Cursor::new(b"Setup Complete\nSample no: lots\nSample freq: 4000\n".to_vec());
        assert!(matches!(
            SerialLink::connect(input, Vec::new()),
            Err(LinkError::Handshake(_))
        ));
    }

    #[test]
    fn reads_signed_byte_frames() {
        let mut input = banner(4, 4000);
        input.extend_from_slice(&[0x01, 0xFF, 0x80, 0x7F]);
        let mut link = SerialLink::connect(Cursor::new(input), Vec::new()).unwrap();
        assert_eq!(link.read_frame().unwrap(), vec![1, -1, -128, 127]);
        assert!(matches!(link.read_frame(), Err(LinkError::Closed)));
    }

    #[test]
    fn reports_short_frames() {
        let mut input = banner(4, 4000);
        input.extend_from_slice(&[1, 2]);
        let mut link = SerialLink::connect(Cursor::new(input), Vec::new()).unwrap();
        assert!(matches!(
            link.read_frame(),
            Err(LinkError::ShortFrame { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn command_is_written_and_acknowledged() {
        let mut input = banner(256, 4000);
        input.extend_from_slice(b"Recieved: 5\r\nRecieved: b\r\nCommand Not Found\r\n");
        let mut link = SerialLink::connect(Cursor::new(input), Vec::new()).unwrap();

        link.send_command(Command::Led(Led::Third)).unwrap();
        link.send_command(Command::FrameLength(FrameLength::Samples512)).unwrap();
        assert_eq!(link.frame_len(), 512);

        let (_, written) = link.into_parts();
        assert_eq!(written, b"5b".to_vec());
    }

    #[test]
    fn wrong_echo_is_not_acknowledged() {
        let mut input = banner(256, 4000);
        input.extend_from_slice(b"Command Not Found\r\n");
        let mut link = SerialLink::connect(Cursor::new(input), Vec::new()).unwrap();
        let err = link.send_command(Command::SampleRate(SampleRate::Hz9000)).unwrap_err();
        assert!(matches!(err, LinkError::NotAcknowledged { code: '9', .. }));
        assert_eq!(link.sample_rate(), 4000);
    }

    #[test]
    fn trailing_line_after_letter_command_is_not_read_as_frame() {
        let mut input = banner(256, 4000);
        input.extend_from_slice(b"Recieved: a\r\nCommand Not Found\r\n");
        input.extend_from_slice(&[7, 0xF9]);
        let mut link = SerialLink::connect(Cursor::new(input), Vec::new()).unwrap();
        link.send_command(Command::FrameLength(FrameLength::Samples256)).unwrap();

        // Pretend the board now sends two-sample frames.
        link.frame_len = 2;
        assert_eq!(link.read_frame().unwrap(), vec![7, -7]);
    }

    #[test]
    fn echo_must_match_the_code_exactly() {
        // Both letters appear in "Command Not Found".
        for command in [
            Command::FrameLength(FrameLength::Samples256),
            Command::FrameLength(FrameLength::Samples1024),
        ] {
            let mut input = banner(256, 4000);
            input.extend_from_slice(b"Command Not Found\r\n");
            let mut link = SerialLink::connect(Cursor::new(input), Vec::new()).unwrap();
            assert!(matches!(
                link.send_command(command),
                Err(LinkError::NotAcknowledged { .. })
            ));
            assert_eq!(link.frame_len(), 256);
        }
    }

    /// Yields some bytes, then reports a read timeout like a serial port.
    struct StalledPort {
        data: Cursor<Vec<u8>>,
    }

    impl Read for StalledPort {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            match self.data.read(buf)? {
                0 => Err(std::io::Error::from(ErrorKind::TimedOut)),
                n => Ok(n),
            }
        }
    }

    #[test]
    fn timeout_gives_short_frame_not_closed() {
        let mut link = ReplayLink::new(StalledPort { data: Cursor::new(vec![1, 2, 3]) }, 2, 4000);
        assert_eq!(link.read_frame().unwrap(), vec![1, 2]);
        assert!(matches!(
            link.read_frame(),
            Err(LinkError::ShortFrame { expected: 2, actual: 1 })
        ));
        assert!(matches!(
            link.read_frame(),
            Err(LinkError::ShortFrame { expected: 2, actual: 0 })
        ));
    }

    #[test]
    fn replay_follows_format_commands() {
        let data: Vec<u8> = vec![1, 2, 3, 4, 5, 6];
        let mut link = ReplayLink::new(Cursor::new(data), 2, 4000);
        assert_eq!(link.read_frame().unwrap(), vec![1, 2]);
        link.send_command(Command::SampleRate(SampleRate::Hz7000)).unwrap();
        assert_eq!(link.sample_rate(), 7000);
        assert_eq!(link.read_frame().unwrap(), vec![3, 4]);
        assert_eq!(link.sent_commands(), &[Command::SampleRate(SampleRate::Hz7000)]);
    }
}
