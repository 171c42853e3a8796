//! Framing of the batch L2 data blob.
//!
//! A batch's transactions are persisted as a single byte string: a sequence
//! of L2 blocks, each introduced by a change-block marker carrying the block
//! timestamp delta and the L1-info-tree leaf index, followed by the block's
//! length-prefixed raw transactions.

use bytes::Bytes;
use ethereum_types::H256;
use keccak_hash::keccak;

/// Marker opening an L2 block inside the batch data.
const CHANGE_L2_BLOCK_MARKER: u8 = 0x0b;
/// Marker preceding each length-prefixed transaction.
const TX_MARKER: u8 = 0x0c;

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum L2DataError {
    #[error("unexpected byte {byte:#04x} at offset {offset}, expected a marker")]
    UnexpectedMarker { offset: usize, byte: u8 },
    #[error("batch data truncated at offset {0}")]
    UnexpectedEof(usize),
}

/// One L2 block as laid out in the batch data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct L2BlockRaw {
    pub delta_timestamp: u32,
    pub l1_info_tree_index: u32,
    pub transactions: Vec<Bytes>,
}

/// A decoded batch L2 data blob.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchRawV2 {
    pub blocks: Vec<L2BlockRaw>,
}

impl BatchRawV2 {
    /// Total number of transactions across every block.
    pub fn tx_count(&self) -> u64 {
        self.blocks
            .iter()
            .map(|block| block.transactions.len() as u64)
            .sum()
    }
}

/// Keccak hash of a raw transaction blob, for logging.
pub fn raw_tx_hash(raw: &[u8]) -> H256 {
    keccak(raw)
}

pub fn encode_batch_l2_data(batch: &BatchRawV2) -> Bytes {
    let mut out = Vec::new();
    for block in &batch.blocks {
        out.push(CHANGE_L2_BLOCK_MARKER);
        out.extend_from_slice(&block.delta_timestamp.to_be_bytes());
        out.extend_from_slice(&block.l1_info_tree_index.to_be_bytes());
        for tx in &block.transactions {
            out.push(TX_MARKER);
            out.extend_from_slice(&(tx.len() as u32).to_be_bytes());
            out.extend_from_slice(tx);
        }
    }
    out.into()
}

pub fn decode_batch_l2_data(data: &[u8]) -> Result<BatchRawV2, L2DataError> {
    let mut blocks = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        if data[pos] != CHANGE_L2_BLOCK_MARKER {
            return Err(L2DataError::UnexpectedMarker {
                offset: pos,
                byte: data[pos],
            });
        }
        pos += 1;

        let delta_timestamp = read_u32(data, &mut pos)?;
        let l1_info_tree_index = read_u32(data, &mut pos)?;

        let mut transactions = Vec::new();
        while pos < data.len() && data[pos] == TX_MARKER {
            pos += 1;
            let len = read_u32(data, &mut pos)? as usize;
            let end = pos
                .checked_add(len)
                .filter(|end| *end <= data.len())
                .ok_or(L2DataError::UnexpectedEof(pos))?;
            transactions.push(Bytes::copy_from_slice(&data[pos..end]));
            pos = end;
        }

        blocks.push(L2BlockRaw {
            delta_timestamp,
            l1_info_tree_index,
            transactions,
        });
    }

    Ok(BatchRawV2 { blocks })
}

fn read_u32(data: &[u8], pos: &mut usize) -> Result<u32, L2DataError> {
    let end = *pos + 4;
    if end > data.len() {
        return Err(L2DataError::UnexpectedEof(*pos));
    }
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[*pos..end]);
    *pos = end;
    Ok(u32::from_be_bytes(buf))
}
