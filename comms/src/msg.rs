use std::io;

use crate::{
    ActorAddr, Deserialize, Serialize,
    specs::session::{SessionId, SessionStatus},
};

type Header = u32;
const HEADER_SIZE: usize = size_of::<Header>();
const WORD_SIZE: usize = size_of::<u64>();
const FLOAT_SIZE: usize = size_of::<f64>();

const ERR_H: Header = 0;
const CONTROL_H: Header = 1;
const WEIGHTS_H: Header = 2;
const GRAD_H: Header = 3;

/// The weights and biases of a single layer, flattened row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerParams {
    pub rows: usize,
    pub cols: usize,
    pub weights: Vec<f64>,
    pub biases: Vec<f64>,
}

/// The payload data for the `Data` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A point-in-time copy of the global model, one entry per layer.
    Weights(Vec<LayerParams>),
    /// The summed gradient of one mini-batch of `batch_size` rows.
    Gradient {
        batch_size: usize,
        layers: Vec<LayerParams>,
    },
}

/// The command for the `Control` variant of the `Msg` enum.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    Connect { name: String },
    Connected,
    GetGlobalWeights,
    Ack,
    IncompatibleShape { detail: String },
    Disconnect,
    StartTraining { aggregator: ActorAddr },
    StartEvaluation { aggregator: ActorAddr },
    SessionStarted { id: SessionId },
    QueryStatus { id: SessionId },
    Status { id: SessionId, status: SessionStatus },
    UnknownSession { id: SessionId },
}

/// The application layer message for the entire system.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    Control(Command),
    Data(Payload),
    Err(String),
}

impl Msg {
    /// A short name of the message kind, for logs and protocol errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Msg::Control(_) => "control",
            Msg::Data(Payload::Weights(_)) => "data/weights",
            Msg::Data(Payload::Gradient { .. }) => "data/gradient",
            Msg::Err(_) => "err",
        }
    }

    fn invalid_data<T>(detail: String) -> io::Result<T> {
        Err(io::Error::new(io::ErrorKind::InvalidData, detail))
    }
}

impl Serialize for Msg {
    fn serialize(&self, buf: &mut Vec<u8>) {
        match self {
            Msg::Err(e) => {
                buf.extend_from_slice(&ERR_H.to_be_bytes());
                buf.extend_from_slice(e.as_bytes());
            }
            Msg::Control(cmd) => {
                buf.extend_from_slice(&CONTROL_H.to_be_bytes());

                // `Command` is derived and keyed by strings only, writing into a Vec can't fail.
                if let Err(e) = serde_json::to_writer(&mut *buf, cmd) {
                    log::error!("failed to encode command {cmd:?}: {e}");
                }
            }
            Msg::Data(Payload::Weights(layers)) => {
                buf.extend_from_slice(&WEIGHTS_H.to_be_bytes());
                write_layers(buf, layers);
            }
            Msg::Data(Payload::Gradient { batch_size, layers }) => {
                buf.extend_from_slice(&GRAD_H.to_be_bytes());
                buf.extend_from_slice(&(*batch_size as u64).to_be_bytes());
                write_layers(buf, layers);
            }
        }
    }
}

impl Deserialize for Msg {
    fn deserialize(buf: &[u8]) -> io::Result<Self> {
        if buf.len() < HEADER_SIZE {
            return Self::invalid_data(format!(
                "The given buffer is too small {}, must at least be {HEADER_SIZE} bytes",
                buf.len()
            ));
        }

        let (kind_buf, rest) = buf.split_at(HEADER_SIZE);
        let mut kind = [0; HEADER_SIZE];
        kind.copy_from_slice(kind_buf);

        match Header::from_be_bytes(kind) {
            ERR_H => {
                let string = std::str::from_utf8(rest)
                    .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;

                Ok(Self::Err(string.to_owned()))
            }
            CONTROL_H => {
                let cmd = serde_json::from_slice(rest)?;
                Ok(Self::Control(cmd))
            }
            WEIGHTS_H => {
                let mut cursor = Cursor::new(rest);
                let layers = read_layers(&mut cursor)?;
                cursor.finish()?;
                Ok(Self::Data(Payload::Weights(layers)))
            }
            GRAD_H => {
                let mut cursor = Cursor::new(rest);
                let batch_size = cursor.word()?;
                let layers = read_layers(&mut cursor)?;
                cursor.finish()?;
                Ok(Self::Data(Payload::Gradient { batch_size, layers }))
            }
            byte => Self::invalid_data(format!("Received an invalid kind header {byte}")),
        }
    }
}

fn write_layers(buf: &mut Vec<u8>, layers: &[LayerParams]) {
    buf.extend_from_slice(&(layers.len() as u64).to_be_bytes());

    for layer in layers {
        buf.extend_from_slice(&(layer.rows as u64).to_be_bytes());
        buf.extend_from_slice(&(layer.cols as u64).to_be_bytes());
        buf.extend_from_slice(&(layer.biases.len() as u64).to_be_bytes());
        buf.extend_from_slice(bytemuck::cast_slice(&layer.weights));
        buf.extend_from_slice(bytemuck::cast_slice(&layer.biases));
    }
}

fn read_layers(cursor: &mut Cursor<'_>) -> io::Result<Vec<LayerParams>> {
    let nlayers = cursor.word()?;
    let mut layers = Vec::with_capacity(nlayers.min(64));

    for _ in 0..nlayers {
        let rows = cursor.word()?;
        let cols = cursor.word()?;
        let nbiases = cursor.word()?;

        let nweights = rows.checked_mul(cols).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Layer of {rows}x{cols} weights overflows"),
            )
        })?;

        let weights = cursor.floats(nweights)?;
        let biases = cursor.floats(nbiases)?;

        layers.push(LayerParams {
            rows,
            cols,
            weights,
            biases,
        });
    }

    Ok(layers)
}

/// A forward-only reader over a data body.
struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf }
    }

    fn take(&mut self, n: usize) -> io::Result<&'a [u8]> {
        if self.buf.len() < n {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("Truncated data body, needed {n} bytes but {} remain", self.buf.len()),
            ));
        }

        let (head, tail) = self.buf.split_at(n);
        self.buf = tail;
        Ok(head)
    }

    fn word(&mut self) -> io::Result<usize> {
        let mut word = [0; WORD_SIZE];
        word.copy_from_slice(self.take(WORD_SIZE)?);
        Ok(u64::from_be_bytes(word) as usize)
    }

    fn floats(&mut self, n: usize) -> io::Result<Vec<f64>> {
        let len = n.checked_mul(FLOAT_SIZE).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, format!("{n} floats overflow"))
        })?;

        let bytes = self.take(len)?;
        Ok(bytemuck::allocation::pod_collect_to_vec(bytes))
    }

    fn finish(self) -> io::Result<()> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} trailing bytes after the data body", self.buf.len()),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> LayerParams {
        LayerParams {
            rows: 2,
            cols: 3,
            weights: vec![0.5, -1.0, 2.0, 0.25, 3.5, -0.125],
            biases: vec![1.0, 2.0, 3.0],
        }
    }

    #[test]
    fn gradient_body_keeps_layer_shapes() {
        let msg = Msg::Data(Payload::Gradient {
            batch_size: 5,
            layers: vec![layer()],
        });

        let mut buf = Vec::new();
        msg.serialize(&mut buf);

        assert_eq!(Msg::deserialize(&buf).unwrap(), msg);
    }

    #[test]
    fn truncated_weights_body_is_invalid_data() {
        let msg = Msg::Data(Payload::Weights(vec![layer()]));
        let mut buf = Vec::new();
        msg.serialize(&mut buf);
        buf.truncate(buf.len() - 3);

        let err = Msg::deserialize(&buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let msg = Msg::Data(Payload::Weights(vec![layer()]));
        let mut buf = Vec::new();
        msg.serialize(&mut buf);
        buf.push(0);

        assert!(Msg::deserialize(&buf).is_err());
    }

    #[test]
    fn unknown_kind_header_is_rejected() {
        let buf = 9u32.to_be_bytes();
        assert!(Msg::deserialize(&buf).is_err());
    }

    #[test]
    fn commands_travel_as_snake_case_json() {
        let msg = Msg::Control(Command::Connect {
            name: "aggregator".into(),
        });

        let mut buf = Vec::new();
        msg.serialize(&mut buf);

        let body = std::str::from_utf8(&buf[HEADER_SIZE..]).unwrap();
        assert_eq!(body, r#"{"connect":{"name":"aggregator"}}"#);
    }
}
