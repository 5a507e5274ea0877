use std::io::{self, Read, Write};

use bincode::{
    Decode, Encode,
    config::{BigEndian, Configuration, Fixint, Limit},
    decode_from_std_read, encode_into_std_write,
};
use thiserror::Error;

use super::{ClientFrame, ServerFrame};

/// Largest frame either side will decode. Anything claiming to be bigger is
/// rejected before any buffer is allocated for it.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to encode message: {0}")]
    Serialize(#[from] bincode::error::EncodeError),
    #[error("failed to decode message: {0}")]
    Deserialize(#[from] bincode::error::DecodeError),
    #[error("Transport IO Error: {0}")]
    Io(#[from] io::Error),
}

impl TransportError {
    /// Whether the peer closed the stream cleanly between two frames.
    pub fn is_eof(&self) -> bool {
        match self {
            TransportError::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
            TransportError::Deserialize(bincode::error::DecodeError::Io { inner, .. }) => {
                inner.kind() == io::ErrorKind::UnexpectedEof
            }
            TransportError::Deserialize(bincode::error::DecodeError::UnexpectedEnd { .. }) => true,
            _ => false,
        }
    }
}

/// Frame codec over one half (or both halves) of a byte stream.
///
/// Reading and writing are independent so the client can drive each direction
/// from its own thread, each owning its own `ProtocolTransport`.
pub struct ProtocolTransport<T> {
    stream: T,
    config: Configuration<BigEndian, Fixint, Limit<MAX_FRAME_SIZE>>,
}

impl<T> ProtocolTransport<T> {
    pub fn new(stream: T) -> Self {
        let config = bincode::config::standard()
            .with_big_endian()
            .with_fixed_int_encoding()
            .with_limit::<MAX_FRAME_SIZE>();
        Self { stream, config }
    }

    pub fn get_ref(&self) -> &T {
        &self.stream
    }
}

impl<T: Write> ProtocolTransport<T> {
    fn write<F: Encode>(&mut self, frame: F) -> Result<(), TransportError> {
        encode_into_std_write(frame, &mut self.stream, self.config)?;
        self.stream.flush()?;
        Ok(())
    }

    pub fn write_request(&mut self, frame: ClientFrame) -> Result<(), TransportError> {
        self.write(frame)
    }

    pub fn write_response(&mut self, frame: ServerFrame) -> Result<(), TransportError> {
        self.write(frame)
    }
}

impl<T: Read> ProtocolTransport<T> {
    fn read<F: Decode<()>>(&mut self) -> Result<F, TransportError> {
        let frame: F = decode_from_std_read(&mut self.stream, self.config)?;
        Ok(frame)
    }

    pub fn read_request(&mut self) -> Result<ClientFrame, TransportError> {
        self.read()
    }

    pub fn read_response(&mut self) -> Result<ServerFrame, TransportError> {
        self.read()
    }
}

#[cfg(test)]
mod tests {
    use std::io::{Cursor, Seek};

    use super::*;
    use crate::protocol::{IterOptions, IterReq, IterRes, Request, Response};

    #[test]
    fn read_write_request() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);
        let frame = ClientFrame {
            lane: 7,
            request: Request::Iter {
                transaction: 2,
                req: IterReq::continuation(11, IterOptions::default()),
            },
        };

        transport.write_request(frame.clone()).unwrap();
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();
        let req = transport.read_request().unwrap();
        assert_eq!(req, frame);
    }

    #[test]
    fn read_write_response() {
        let stream = Cursor::new(Vec::new());
        let mut transport = ProtocolTransport::new(stream);
        let frame = ServerFrame {
            lane: 1,
            response: Response::Iter(IterRes::answer(b"x".to_vec())),
        };

        transport.write_response(frame.clone()).unwrap();
        transport.stream.seek(std::io::SeekFrom::Start(0)).unwrap();
        let resp = transport.read_response().unwrap();
        assert_eq!(resp, frame);
    }

    #[test]
    fn oversized_answer_is_rejected() {
        let mut transport = ProtocolTransport::new(Cursor::new(Vec::new()));
        transport
            .write_response(ServerFrame {
                lane: 1,
                response: Response::Iter(IterRes::answer(b"x".to_vec())),
            })
            .unwrap();

        // lane (8) + variant (4) + iterator id (8) + done (1) + option tag (1)
        let mut bytes = transport.stream.into_inner();
        bytes[22..30].copy_from_slice(&(1u64 << 40).to_be_bytes());

        let mut transport = ProtocolTransport::new(Cursor::new(bytes));
        let err = transport.read_response().unwrap_err();
        assert!(matches!(
            err,
            TransportError::Deserialize(bincode::error::DecodeError::LimitExceeded)
        ));
        assert!(!err.is_eof());
    }

    #[test]
    fn empty_stream_is_eof() {
        let mut transport = ProtocolTransport::new(Cursor::new(Vec::new()));

        let err = transport.read_response().unwrap_err();
        assert!(err.is_eof());
    }
}
