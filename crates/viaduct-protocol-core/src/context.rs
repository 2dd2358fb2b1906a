use crate::codec::{write_varint, Codec, CodecRef};
use crate::error::{TranslateError, TranslateResult};
use crate::state::Direction;
use crate::types::{natural_codec, NOTHING};
use crate::user::{ConnectionId, Outbox, UserConnection};
use crate::value::{Value, WireValue};
use bytes::BytesMut;
use std::collections::VecDeque;
use std::fmt::Write as _;
use tracing::warn;

/// One packet in the middle of translation.
///
/// Values already produced sit in `output` in wire order. Values read from the
/// original packet but not yet re-emitted sit in `readable` (only after
/// [`reset_reader`](Self::reset_reader)); anything not yet classified is still
/// raw bytes in `input`.
pub struct PacketContext {
    id: Option<i32>,
    connection: ConnectionId,
    input: Option<BytesMut>,
    input_len: usize,
    readable: VecDeque<(CodecRef, Value)>,
    output: Vec<(CodecRef, Value)>,
    cancelled: bool,
    shape_mismatches: usize,
}

impl PacketContext {
    pub fn new(id: Option<i32>, input: Option<BytesMut>, connection: ConnectionId) -> Self {
        let input_len = input.as_ref().map_or(0, |buf| buf.len());
        Self {
            id,
            connection,
            input,
            input_len,
            readable: VecDeque::new(),
            output: Vec::new(),
            cancelled: false,
            shape_mismatches: 0,
        }
    }

    pub fn id(&self) -> Option<i32> {
        self.id
    }

    pub fn set_id(&mut self, id: Option<i32>) {
        self.id = id;
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    /// The `index`-th value written under `codec`.
    pub fn get<T: WireValue>(&self, codec: &'static Codec<T>, index: usize) -> TranslateResult<T> {
        let value = self.get_value(codec.into(), index)?;
        T::from_ref(value)
            .cloned()
            .ok_or_else(|| self.wrong_shape(codec.into(), index, value))
    }

    /// Mutable access to the `index`-th value written under `codec`.
    pub fn get_mut<T: WireValue>(
        &mut self,
        codec: &'static Codec<T>,
        index: usize,
    ) -> TranslateResult<&mut T> {
        let codec = CodecRef::from(codec);
        let position = self.position(codec, index)?;
        let found = self.output[position].1.shape();
        let packet_id = self.id;
        T::from_mut(&mut self.output[position].1).ok_or(TranslateError::WrongShape {
            codec: codec.name(),
            index,
            found,
            packet_id,
        })
    }

    pub fn get_value(&self, codec: CodecRef, index: usize) -> TranslateResult<&Value> {
        let position = self.position(codec, index)?;
        Ok(&self.output[position].1)
    }

    /// Replace the `index`-th value written under `codec`.
    pub fn set<T: WireValue>(
        &mut self,
        codec: &'static Codec<T>,
        index: usize,
        value: T,
    ) -> TranslateResult<()> {
        let position = self.position(codec.into(), index)?;
        self.output[position].1 = value.into_value();
        Ok(())
    }

    /// Read the next value from the input as `codec`.
    pub fn read<T: WireValue>(&mut self, codec: &'static Codec<T>) -> TranslateResult<T> {
        let value = self.read_value(codec.into())?;
        T::from_value(value).map_err(|found| TranslateError::ReadMismatch {
            expected: codec.name(),
            found: found.shape().name(),
            packet_id: self.id,
            output: self.snapshot(),
        })
    }

    /// Read the next value from the input as `codec`, without a static type.
    ///
    /// Queued values must have been written under the same codec. Queued
    /// [`NOTHING`] placeholders are skipped, and reading `NOTHING` always
    /// succeeds without consuming anything.
    pub fn read_value(&mut self, codec: CodecRef) -> TranslateResult<Value> {
        let nothing = CodecRef::from(&NOTHING);
        if codec == nothing {
            return Ok(Value::Nothing);
        }
        while let Some((queued, value)) = self.readable.pop_front() {
            if queued == codec {
                return Ok(value);
            }
            if queued == nothing {
                continue;
            }
            return Err(TranslateError::ReadMismatch {
                expected: codec.name(),
                found: queued.name(),
                packet_id: self.id,
                output: self.snapshot(),
            });
        }

        let offset = self.offset();
        let Some(input) = self.input.as_mut() else {
            return Err(TranslateError::NoInput {
                codec: codec.name(),
                packet_id: self.id,
            });
        };
        codec.read_value(input).map_err(|source| TranslateError::Decode {
            codec: codec.name(),
            packet_id: self.id,
            offset,
            output: self.snapshot(),
            source,
        })
    }

    /// Append a value to the output.
    pub fn write<T: WireValue>(&mut self, codec: &'static Codec<T>, value: T) {
        self.output.push((codec.into(), value.into_value()));
    }

    /// Append a value whose shape is only known at runtime.
    ///
    /// A value of the wrong shape is converted if the codec allows it;
    /// otherwise it is stored as-is, a warning is raised, and serialization
    /// writes it with the codec of its own shape.
    pub fn write_value(&mut self, codec: CodecRef, value: Value) {
        let value = self.adapt(codec, value);
        self.output.push((codec, value));
    }

    /// Read a value and write it straight back.
    pub fn passthrough<T: WireValue>(&mut self, codec: &'static Codec<T>) -> TranslateResult<T> {
        let value = self.read(codec)?;
        self.write(codec, value.clone());
        Ok(value)
    }

    /// Pass every remaining raw byte through untouched.
    pub fn passthrough_all(&mut self) -> TranslateResult<()> {
        let value = self.read(&crate::types::REMAINING_BYTES)?;
        self.write(&crate::types::REMAINING_BYTES, value);
        Ok(())
    }

    pub fn cancel(&mut self) {
        self.cancelled = true;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    /// Number of shape mismatches that could not be converted away.
    pub fn shape_mismatches(&self) -> usize {
        self.shape_mismatches
    }

    /// Move the output back into the input queue so another rule set can
    /// read the packet again from the start.
    pub fn reset_reader(&mut self) {
        let mut requeued: VecDeque<_> = self.output.drain(..).collect();
        requeued.append(&mut self.readable);
        self.readable = requeued;
    }

    /// Forget all unread input, queued and raw.
    pub fn clear_input(&mut self) {
        if let Some(input) = self.input.as_mut() {
            input.clear();
        }
        self.readable.clear();
    }

    /// Give back the raw bytes not read yet.
    pub fn into_input(self) -> Option<BytesMut> {
        self.input
    }

    pub fn output_len(&self) -> usize {
        self.output.len()
    }

    /// Write id, output values, unread queued values and raw residue to `sink`.
    ///
    /// Writes nothing when cancelled. On failure `sink` is left untouched.
    pub fn serialize(&self, sink: &mut BytesMut) -> TranslateResult<()> {
        if self.cancelled {
            return Ok(());
        }
        let mut buf = BytesMut::new();
        if let Some(id) = self.id {
            write_varint(&mut buf, id);
        }
        let entries = self.output.iter().chain(self.readable.iter());
        for (index, (codec, value)) in entries.enumerate() {
            let result = if value.shape() == codec.shape() {
                codec.write_value(&mut buf, value)
            } else {
                match codec.convert_value(value.clone()) {
                    Ok(converted) => codec.write_value(&mut buf, &converted),
                    // already warned about on write; the value goes out as it is
                    Err(original) => match natural_codec(original.shape()) {
                        Some(natural) => natural.write_value(&mut buf, &original),
                        None => codec.write_value(&mut buf, &original),
                    },
                }
            };
            result.map_err(|source| TranslateError::Encode {
                index,
                codec: codec.name(),
                packet_id: self.id,
                source,
            })?;
        }
        if let Some(input) = &self.input {
            buf.extend_from_slice(input);
        }
        sink.unsplit(buf);
        Ok(())
    }

    /// Start a brand-new packet for the same connection.
    pub fn derive(&self, id: i32) -> PacketContext {
        PacketContext::new(Some(id), None, self.connection)
    }

    /// Serialize into the connection's outbox, addressed to the client.
    pub fn send(self, conn: &mut UserConnection) -> TranslateResult<()> {
        self.send_towards(Direction::Outbound, conn)
    }

    /// Serialize into the connection's outbox, addressed to the server.
    pub fn send_to_server(self, conn: &mut UserConnection) -> TranslateResult<()> {
        self.send_towards(Direction::Inbound, conn)
    }

    fn send_towards(self, direction: Direction, conn: &mut UserConnection) -> TranslateResult<()> {
        debug_assert_eq!(self.connection, conn.id());
        self.send_to(direction, conn.outbox_mut())
    }

    /// Serialize straight into an outbox. Used by stored objects, which only
    /// see the outbox of their connection.
    pub fn send_to(self, direction: Direction, outbox: &mut Outbox) -> TranslateResult<()> {
        if self.cancelled {
            return Ok(());
        }
        let mut buf = BytesMut::new();
        self.serialize(&mut buf)?;
        outbox.push(direction, buf);
        Ok(())
    }

    /// Debug rendering of the output so far, for error reports.
    pub fn snapshot(&self) -> String {
        let mut out = String::from("[");
        for (i, (codec, value)) in self.output.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{:?}={:?}", codec, value);
        }
        out.push(']');
        out
    }

    fn offset(&self) -> usize {
        self.input_len - self.input.as_ref().map_or(0, |buf| buf.len())
    }

    fn position(&self, codec: CodecRef, index: usize) -> TranslateResult<usize> {
        self.output
            .iter()
            .enumerate()
            .filter(|(_, (written, _))| *written == codec)
            .nth(index)
            .map(|(position, _)| position)
            .ok_or_else(|| TranslateError::FieldLookup {
                codec: codec.name(),
                index,
                packet_id: self.id,
                output: self.snapshot(),
            })
    }

    fn adapt(&mut self, codec: CodecRef, value: Value) -> Value {
        if value.shape() == codec.shape() {
            return value;
        }
        match codec.convert_value(value) {
            Ok(converted) => converted,
            Err(original) => {
                self.shape_mismatches += 1;
                warn!(
                    "Possible type mismatch in packet {:?}: {} -> {}",
                    self.id,
                    original.shape(),
                    codec.name()
                );
                original
            }
        }
    }

    fn wrong_shape(&self, codec: CodecRef, index: usize, value: &Value) -> TranslateError {
        TranslateError::WrongShape {
            codec: codec.name(),
            index,
            found: value.shape(),
            packet_id: self.id,
        }
    }
}
