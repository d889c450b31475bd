/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! The composite view of a layer: every ballot and block the mesh has ingested for one layer
//! index. Returned by [`crate::mesh::Mesh::get_layer`].

use crate::types::ballot::Ballot;
use crate::types::basic::LayerId;
use crate::types::block::Block;

#[derive(Clone, Debug)]
pub struct Layer {
    index: LayerId,
    ballots: Vec<Ballot>,
    blocks: Vec<Block>,
}

impl Layer {
    pub fn new(index: LayerId, ballots: Vec<Ballot>, blocks: Vec<Block>) -> Layer {
        Layer {
            index,
            ballots,
            blocks,
        }
    }

    pub fn index(&self) -> LayerId {
        self.index
    }

    pub fn ballots(&self) -> &Vec<Ballot> {
        &self.ballots
    }

    pub fn blocks(&self) -> &Vec<Block> {
        &self.blocks
    }
}
