//! Compiler basic-block annotation loader.
//!
//! A companion compiler pass emits one JSON descriptor file per traced
//! process, `proc_{id}_bb_info.json`, consumed only by the Co-Simulation
//! offload heuristic. This module treats the file as read-only and, per the
//! compiler annotation contract, optional: a missing file degrades that
//! process's heuristic to "never offload" rather than aborting the run,
//! since `Co-Simulation` mode without BB-info is a valid (if pessimal)
//! configuration.

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;

/// One basic block's instruction-mix counters, as emitted by the compiler
/// annotation pass.
#[derive(Debug, Clone, Deserialize)]
pub struct BasicBlockInfo {
    /// Compiler-assigned basic block ID; matches a trace record's `regionID`
    /// when that record delimits this block.
    #[serde(rename = "BasicBlockID")]
    pub basic_block_id: u64,
    /// Human-readable block name (unused by the offload heuristic, kept for
    /// fidelity with the descriptor format).
    #[serde(rename = "BasicBlockName")]
    pub basic_block_name: String,
    /// Memory instruction count.
    #[serde(rename = "MemoryInstructions")]
    pub memory_instructions: u64,
    /// Non-memory (ALU/control) instruction count.
    #[serde(rename = "NonMemoryInstructions")]
    pub non_memory_instructions: u64,
    /// Arithmetic instruction count (subset of non-memory, tracked
    /// separately by the compiler pass).
    #[serde(rename = "ArithmeticInstructions")]
    pub arithmetic_instructions: u64,
    /// Total instruction count for the block.
    #[serde(rename = "TotalInstructions")]
    pub total_instructions: u64,
    /// Total bytes of memory touched by the block.
    #[serde(rename = "TotalMemoryConsumption")]
    pub total_memory_consumption: u64,
}

/// One traced function's basic blocks.
#[derive(Debug, Clone, Deserialize)]
pub struct FunctionInfo {
    /// Function name.
    #[serde(rename = "FunctionName")]
    pub function_name: String,
    /// Basic blocks belonging to this function.
    #[serde(rename = "BasicBlocks")]
    pub basic_blocks: Vec<BasicBlockInfo>,
}

/// A loaded `proc_{id}_bb_info.json` descriptor, indexed by basic-block ID
/// for O(1) lookup from the offload heuristic (which only ever asks "what
/// does regionID R look like").
#[derive(Debug, Clone, Default)]
pub struct BbInfo {
    by_block_id: HashMap<u64, BasicBlockInfo>,
}

impl BbInfo {
    /// Loads and indexes a descriptor file for process `process_id` from
    /// `json_path`, following the `proc_{id}_bb_info.json` naming pattern.
    /// Returns `Ok(None)` (not an error) if the file does not exist, per the
    /// compiler annotation contract; returns `Err` only if the file exists
    /// but fails to read or parse.
    pub fn load(json_path: &Path, process_id: u64) -> Result<Option<Self>, crate::common::SimError> {
        let path = json_path.join(format!("proc_{process_id}_bb_info.json"));
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(&path).map_err(|source| crate::common::SimError::BbInfoFile {
            path: path.clone(),
            source,
        })?;
        let functions: Vec<FunctionInfo> = serde_json::from_str(&contents).map_err(|e| crate::common::SimError::BbInfoFile {
            path,
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        let mut by_block_id = HashMap::new();
        for function in functions {
            for block in function.basic_blocks {
                by_block_id.insert(block.basic_block_id, block);
            }
        }
        Ok(Some(Self { by_block_id }))
    }

    /// Looks up the basic block for `region_id`, if this descriptor has it.
    pub fn block(&self, region_id: u64) -> Option<&BasicBlockInfo> {
        self.by_block_id.get(&region_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let loaded = BbInfo::load(dir.path(), 42).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn loads_and_indexes_by_block_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("proc_7_bb_info.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"[{{"FunctionName":"f","BasicBlocks":[{{"BasicBlockID":3,"BasicBlockName":"bb3","MemoryInstructions":10,"NonMemoryInstructions":2,"ArithmeticInstructions":1,"TotalInstructions":12,"TotalMemoryConsumption":640}}]}}]"#
        )
        .unwrap();
        let info = BbInfo::load(dir.path(), 7).unwrap().unwrap();
        let block = info.block(3).unwrap();
        assert_eq!(block.memory_instructions, 10);
        assert_eq!(block.non_memory_instructions, 2);
    }
}
