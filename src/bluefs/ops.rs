//! BlueFS transaction operations: opcode table and per-op payload parsing.

use super::FNode;
use crate::{
	cursor::{read_fixed_int, read_string, read_u8, ByteCursor},
	error::{Error, Result},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
	None,
	Init,
	AllocAdd,
	AllocRm,
	DirLink,
	DirUnlink,
	DirCreate,
	DirRemove,
	FileUpdate,
	FileRemove,
	Jump,
	JumpSeq,
}

impl OpCode {
	fn from_u8(v: u8) -> Result<Self> {
		Ok(match v {
			0 => Self::None,
			1 => Self::Init,
			2 => Self::AllocAdd,
			3 => Self::AllocRm,
			4 => Self::DirLink,
			5 => Self::DirUnlink,
			6 => Self::DirCreate,
			7 => Self::DirRemove,
			8 => Self::FileUpdate,
			9 => Self::FileRemove,
			10 => Self::Jump,
			11 => Self::JumpSeq,
			_ => {
				return Err(Error::NotImplementedVersion {
					what: "BlueFS operation code".into(),
					version: v,
					minimum: 0,
				})
			}
		})
	}
}

impl std::fmt::Display for OpCode {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let s = match self {
			Self::None => "NONE",
			Self::Init => "INIT",
			Self::AllocAdd => "ALLOC_ADD",
			Self::AllocRm => "ALLOC_RM",
			Self::DirLink => "DIR_LINK",
			Self::DirUnlink => "DIR_UNLINK",
			Self::DirCreate => "DIR_CREATE",
			Self::DirRemove => "DIR_REMOVE",
			Self::FileUpdate => "FILE_UPDATE",
			Self::FileRemove => "FILE_REMOVE",
			Self::Jump => "JUMP",
			Self::JumpSeq => "JUMP_SEQ",
		};
		f.write_str(s)
	}
}

#[derive(Debug, Clone)]
pub enum Op {
	None,
	Init,
	AllocAdd { id: u8, offset: u64, length: u64 },
	AllocRm { id: u8, offset: u64, length: u64 },
	DirLink { dir: String, file: String, ino: u64 },
	DirUnlink { dir: String, file: String },
	DirCreate { dir: String },
	DirRemove { dir: String },
	FileUpdate(FNode),
	FileRemove { ino: u64 },
	Jump { next_seq: u64, offset: u64 },
	JumpSeq { next_seq: u64 },
}

impl Op {
	pub fn code(&self) -> OpCode {
		match self {
			Self::None => OpCode::None,
			Self::Init => OpCode::Init,
			Self::AllocAdd { .. } => OpCode::AllocAdd,
			Self::AllocRm { .. } => OpCode::AllocRm,
			Self::DirLink { .. } => OpCode::DirLink,
			Self::DirUnlink { .. } => OpCode::DirUnlink,
			Self::DirCreate { .. } => OpCode::DirCreate,
			Self::DirRemove { .. } => OpCode::DirRemove,
			Self::FileUpdate(_) => OpCode::FileUpdate,
			Self::FileRemove { .. } => OpCode::FileRemove,
			Self::Jump { .. } => OpCode::Jump,
			Self::JumpSeq { .. } => OpCode::JumpSeq,
		}
	}

	fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let code = OpCode::from_u8(read_u8(c)?)?;
		Ok(match code {
			OpCode::None => Op::None,
			OpCode::Init => Op::Init,
			OpCode::AllocAdd | OpCode::AllocRm => {
				let id = read_u8(c)?;
				let offset = read_fixed_int(c, 8, false)? as u64;
				let length = read_fixed_int(c, 8, false)? as u64;
				if code == OpCode::AllocAdd {
					Op::AllocAdd { id, offset, length }
				} else {
					Op::AllocRm { id, offset, length }
				}
			}
			OpCode::DirLink => {
				let dir = read_string(c)?;
				let file = read_string(c)?;
				let ino = read_fixed_int(c, 8, false)? as u64;
				Op::DirLink { dir, file, ino }
			}
			OpCode::DirUnlink => {
				let dir = read_string(c)?;
				let file = read_string(c)?;
				Op::DirUnlink { dir, file }
			}
			OpCode::DirCreate => Op::DirCreate { dir: read_string(c)? },
			OpCode::DirRemove => Op::DirRemove { dir: read_string(c)? },
			OpCode::FileUpdate => Op::FileUpdate(FNode::parse(c)?),
			OpCode::FileRemove => Op::FileRemove {
				ino: read_fixed_int(c, 8, false)? as u64,
			},
			OpCode::Jump => {
				let next_seq = read_fixed_int(c, 8, false)? as u64;
				let offset = read_fixed_int(c, 8, false)? as u64;
				Op::Jump { next_seq, offset }
			}
			OpCode::JumpSeq => Op::JumpSeq {
				next_seq: read_fixed_int(c, 8, false)? as u64,
			},
		})
	}
}

/// `len:u32` followed by operations filling exactly `len` bytes.
#[derive(Debug, Clone)]
pub struct Transaction {
	pub ops: Vec<Op>,
}

impl Transaction {
	pub fn parse(c: &mut dyn ByteCursor) -> Result<Self> {
		let len = read_fixed_int(c, 4, false)? as u64;
		let end_offset = c.tell() + len;
		let mut ops = Vec::new();
		while c.tell() < end_offset {
			ops.push(Op::parse(c)?);
		}
		if c.tell() != end_offset {
			return Err(Error::DecodeMismatch {
				offset: end_offset - len,
				expected: end_offset,
				actual: c.tell(),
			});
		}
		Ok(Self { ops })
	}
}
