//! Allow-list Merkle tree.
//!
//! Leaves are the Keccak-256 of each wallet's base58 string. Parent nodes hash
//! the two children in ascending byte order, and an unpaired last node moves up
//! a level unchanged. This matches the candy guard's on-chain proof check.

use sha3::{Digest, Keccak256};
use solana_sdk::pubkey::Pubkey;

pub type Node = [u8; 32];

pub fn keccak(parts: &[&[u8]]) -> Node {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    hasher.finalize().into()
}

fn hash_pair(a: &Node, b: &Node) -> Node {
    if a <= b {
        keccak(&[a, b])
    } else {
        keccak(&[b, a])
    }
}

pub fn leaf(address: &str) -> Node {
    keccak(&[address.as_bytes()])
}

pub struct MerkleTree {
    layers: Vec<Vec<Node>>,
}

impl MerkleTree {
    pub fn new<S: AsRef<str>>(addresses: &[S]) -> Self {
        let leaves: Vec<Node> = addresses.iter().map(|a| leaf(a.as_ref())).collect();
        let mut layers = vec![leaves];

        while layers.last().map_or(false, |l| l.len() > 1) {
            let prev = &layers[layers.len() - 1];
            let next = prev
                .chunks(2)
                .map(|pair| match pair {
                    [left, right] => hash_pair(left, right),
                    [single] => *single,
                    _ => unreachable!(),
                })
                .collect();
            layers.push(next);
        }
        Self { layers }
    }

    /// All-zero root for an empty list.
    pub fn root(&self) -> Node {
        self.layers
            .last()
            .and_then(|l| l.first().copied())
            .unwrap_or([0u8; 32])
    }

    /// Sibling path for the first occurrence of `address`, or `None` when absent.
    pub fn proof(&self, address: &str) -> Option<Vec<Node>> {
        let target = leaf(address);
        let mut index = self.layers.first()?.iter().position(|l| *l == target)?;

        let mut proof = Vec::new();
        for layer in &self.layers[..self.layers.len() - 1] {
            let sibling = if index % 2 == 1 { index - 1 } else { index + 1 };
            if let Some(node) = layer.get(sibling) {
                proof.push(*node);
            }
            index /= 2;
        }
        Some(proof)
    }

    pub fn contains(&self, address: &str) -> bool {
        let target = leaf(address);
        self.layers
            .first()
            .map_or(false, |leaves| leaves.contains(&target))
    }
}

pub fn verify(root: &Node, proof: &[Node], wallet: &Pubkey) -> bool {
    let computed = proof
        .iter()
        .fold(leaf(&wallet.to_string()), |acc, node| hash_pair(&acc, node));
    computed == *root
}
