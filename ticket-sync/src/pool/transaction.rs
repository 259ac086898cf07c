//! Decoding of raw ticket transactions.
//!
//! Transactions use the full serialization of the chain: a prefix holding inputs, outputs, lock time and expiry,
//! followed by a witness holding the value and signature script of each input.

use std::io::{self, Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use super::hash::{HASH_SIZE, Hash};

/// Serialization type carrying both prefix and witness.
const SERIALIZATION_FULL: u16 = 0;

// a serialized input prefix is at least 41 bytes, an output at least 11
const MIN_TX_IN_PREFIX_SIZE: u64 = 41;
const MIN_TX_OUT_SIZE: u64 = 11;
const MIN_TX_IN_WITNESS_SIZE: u64 = 17;

/// Errors decoding a [`Transaction`].
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
    /// Payload is not hex.
    #[error("invalid hex. {0}")]
    InvalidHex(#[from] hex::FromHexError),
    /// Payload ended early or could not be read.
    #[error("failed to read transaction. {0}")]
    Io(#[from] io::Error),
    /// Only full serializations can be decoded.
    #[error("unsupported serialization type {0}")]
    UnsupportedSerializationType(u16),
    /// A count exceeds what the remaining payload could hold.
    #[error("{field} count {count} exceeds remaining payload")]
    CountTooLarge {
        /// Counted field.
        field: &'static str,
        /// Decoded count.
        count: u64,
    },
    /// Witness and prefix disagree on the number of inputs.
    #[error("witness count {witnesses} does not match input count {inputs}")]
    WitnessCountMismatch {
        /// Inputs in the prefix.
        inputs: usize,
        /// Inputs in the witness.
        witnesses: usize,
    },
    /// Bytes left over after the transaction.
    #[error("{0} trailing bytes after transaction")]
    TrailingBytes(usize),
}

/// Previous output spent by an input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutPoint {
    /// Transaction holding the spent output.
    pub hash: Hash,
    /// Index of the spent output.
    pub index: u32,
    /// Transaction tree of the spent output.
    pub tree: i8,
}

/// Transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    /// Spent output.
    pub previous_outpoint: OutPoint,
    /// Sequence number.
    pub sequence: u32,
    /// Value of the spent output in atoms.
    pub value_in: i64,
    /// Height of the block holding the spent output.
    pub block_height: u32,
    /// Index of the spent transaction in its block.
    pub block_index: u32,
    /// Signature script.
    pub signature_script: Vec<u8>,
}

/// Transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    /// Value in atoms.
    pub value: i64,
    /// Script version.
    pub script_version: u16,
    /// Public key script.
    pub pk_script: Vec<u8>,
}

/// Decoded transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Transaction version.
    pub version: u16,
    /// Inputs.
    pub inputs: Vec<TxIn>,
    /// Outputs.
    pub outputs: Vec<TxOut>,
    /// Lock time.
    pub lock_time: u32,
    /// Expiry height.
    pub expiry: u32,
}

impl Transaction {
    /// Decodes a hex encoded full serialization, rejecting trailing bytes.
    pub fn from_hex(hex_str: &str) -> Result<Self, TransactionError> {
        let bytes = hex::decode(hex_str.trim())?;
        let mut cursor = Cursor::new(bytes.as_slice());
        let transaction = Self::read(&mut cursor)?;
        let trailing = bytes.len() - cursor.position() as usize;
        if trailing != 0 {
            return Err(TransactionError::TrailingBytes(trailing));
        }

        Ok(transaction)
    }

    /// Hex encodes the full serialization.
    pub fn to_hex(&self) -> io::Result<String> {
        let mut bytes = Vec::new();
        self.write(&mut bytes)?;
        Ok(hex::encode(bytes))
    }

    /// Deserialize from `reader`. `reader` must be a cursor so counts can be checked against the remaining
    /// payload.
    pub fn read(reader: &mut Cursor<&[u8]>) -> Result<Self, TransactionError> {
        let version_and_type = reader.read_u32::<LittleEndian>()?;
        let version = (version_and_type & 0xffff) as u16;
        let serialization_type = (version_and_type >> 16) as u16;
        if serialization_type != SERIALIZATION_FULL {
            return Err(TransactionError::UnsupportedSerializationType(serialization_type));
        }

        let input_count = read_count(reader, "input", MIN_TX_IN_PREFIX_SIZE)?;
        let mut inputs = Vec::with_capacity(input_count);
        for _ in 0..input_count {
            let mut hash = [0u8; HASH_SIZE];
            reader.read_exact(&mut hash)?;
            let index = reader.read_u32::<LittleEndian>()?;
            let tree = reader.read_i8()?;
            let sequence = reader.read_u32::<LittleEndian>()?;
            inputs.push(TxIn {
                previous_outpoint: OutPoint {
                    hash: Hash::from_bytes(hash),
                    index,
                    tree,
                },
                sequence,
                value_in: 0,
                block_height: 0,
                block_index: 0,
                signature_script: Vec::new(),
            });
        }

        let output_count = read_count(reader, "output", MIN_TX_OUT_SIZE)?;
        let mut outputs = Vec::with_capacity(output_count);
        for _ in 0..output_count {
            let value = reader.read_i64::<LittleEndian>()?;
            let script_version = reader.read_u16::<LittleEndian>()?;
            let pk_script = read_var_bytes(reader, "script")?;
            outputs.push(TxOut {
                value,
                script_version,
                pk_script,
            });
        }

        let lock_time = reader.read_u32::<LittleEndian>()?;
        let expiry = reader.read_u32::<LittleEndian>()?;

        let witness_count = read_count(reader, "witness", MIN_TX_IN_WITNESS_SIZE)?;
        if witness_count != inputs.len() {
            return Err(TransactionError::WitnessCountMismatch {
                inputs: inputs.len(),
                witnesses: witness_count,
            });
        }
        for input in inputs.iter_mut() {
            input.value_in = reader.read_i64::<LittleEndian>()?;
            input.block_height = reader.read_u32::<LittleEndian>()?;
            input.block_index = reader.read_u32::<LittleEndian>()?;
            input.signature_script = read_var_bytes(reader, "signature script")?;
        }

        Ok(Self {
            version,
            inputs,
            outputs,
            lock_time,
            expiry,
        })
    }

    /// Serialize into `writer`
    pub fn write<W: Write>(&self, mut writer: W) -> io::Result<()> {
        writer.write_u32::<LittleEndian>(
            u32::from(self.version) | (u32::from(SERIALIZATION_FULL) << 16),
        )?;

        write_compact_size(&mut writer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            writer.write_all(input.previous_outpoint.hash.as_bytes())?;
            writer.write_u32::<LittleEndian>(input.previous_outpoint.index)?;
            writer.write_i8(input.previous_outpoint.tree)?;
            writer.write_u32::<LittleEndian>(input.sequence)?;
        }

        write_compact_size(&mut writer, self.outputs.len() as u64)?;
        for output in &self.outputs {
            writer.write_i64::<LittleEndian>(output.value)?;
            writer.write_u16::<LittleEndian>(output.script_version)?;
            write_compact_size(&mut writer, output.pk_script.len() as u64)?;
            writer.write_all(&output.pk_script)?;
        }

        writer.write_u32::<LittleEndian>(self.lock_time)?;
        writer.write_u32::<LittleEndian>(self.expiry)?;

        write_compact_size(&mut writer, self.inputs.len() as u64)?;
        for input in &self.inputs {
            writer.write_i64::<LittleEndian>(input.value_in)?;
            writer.write_u32::<LittleEndian>(input.block_height)?;
            writer.write_u32::<LittleEndian>(input.block_index)?;
            write_compact_size(&mut writer, input.signature_script.len() as u64)?;
            writer.write_all(&input.signature_script)?;
        }

        Ok(())
    }

    /// Sum of input values in atoms, as committed in the witness. `None` on overflow.
    #[must_use]
    pub fn total_input_value(&self) -> Option<i64> {
        self.inputs
            .iter()
            .try_fold(0i64, |total, input| total.checked_add(input.value_in))
    }

    /// Sum of output values in atoms. `None` on overflow.
    #[must_use]
    pub fn total_output_value(&self) -> Option<i64> {
        self.outputs
            .iter()
            .try_fold(0i64, |total, output| total.checked_add(output.value))
    }

    /// Fee paid to miners in atoms. `None` if outputs exceed inputs or a total does not fit in an `i64`.
    #[must_use]
    pub fn fee(&self) -> Option<i64> {
        let fee = self
            .total_input_value()?
            .checked_sub(self.total_output_value()?)?;
        (fee >= 0).then_some(fee)
    }
}

fn read_compact_size<R: Read>(reader: &mut R) -> io::Result<u64> {
    Ok(match reader.read_u8()? {
        0xfd => u64::from(reader.read_u16::<LittleEndian>()?),
        0xfe => u64::from(reader.read_u32::<LittleEndian>()?),
        0xff => reader.read_u64::<LittleEndian>()?,
        n => u64::from(n),
    })
}

fn write_compact_size<W: Write>(writer: &mut W, size: u64) -> io::Result<()> {
    match size {
        0..=0xfc => writer.write_u8(size as u8),
        0xfd..=0xffff => {
            writer.write_u8(0xfd)?;
            writer.write_u16::<LittleEndian>(size as u16)
        }
        0x1_0000..=0xffff_ffff => {
            writer.write_u8(0xfe)?;
            writer.write_u32::<LittleEndian>(size as u32)
        }
        _ => {
            writer.write_u8(0xff)?;
            writer.write_u64::<LittleEndian>(size)
        }
    }
}

fn remaining(reader: &Cursor<&[u8]>) -> u64 {
    (reader.get_ref().len() as u64).saturating_sub(reader.position())
}

// reads a count of items serialized in at least `min_item_size` bytes each
fn read_count(
    reader: &mut Cursor<&[u8]>,
    field: &'static str,
    min_item_size: u64,
) -> Result<usize, TransactionError> {
    let count = read_compact_size(reader)?;
    if count.saturating_mul(min_item_size) > remaining(reader) {
        return Err(TransactionError::CountTooLarge { field, count });
    }

    Ok(count as usize)
}

fn read_var_bytes(
    reader: &mut Cursor<&[u8]>,
    field: &'static str,
) -> Result<Vec<u8>, TransactionError> {
    let len = read_count(reader, field, 1)?;
    let mut bytes = vec![0u8; len];
    reader.read_exact(&mut bytes)?;

    Ok(bytes)
}
