// Bitcoin & Elements wallet-level library implementing HD key derivation,
// output descriptors, transaction signing & PSBT processing
// Written in 2020 by
//     Dr. Maxim Orlovsky <orlovsky@pandoracore.com>
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! Taproot script trees for `tr(KEY,TREE)` descriptors: binary trees with
//! miniscript leaves, BIP-341 leaf/branch hashing and merkle-path
//! extraction for control blocks.

use core::fmt::{self, Display, Formatter};

use super::arguments::Key;
use super::lex::Cursor;
use super::miniscript::{self, Miniscript};
use crate::consensus::{ConsensusEncode, VarInt};
use crate::hashes::tagged_hash;

/// Tapscript leaf version used by this library
pub const TAPROOT_LEAF_VERSION: u8 = 0xC0;

/// BIP-341 tapleaf hash of a script with the default leaf version
pub fn tap_leaf_hash(script: &[u8]) -> [u8; 32] {
    let mut data = Vec::with_capacity(script.len() + 2);
    data.push(TAPROOT_LEAF_VERSION);
    VarInt::from(script.len())
        .consensus_encode(&mut data)
        .expect("in-memory encoding");
    data.extend_from_slice(script);
    tagged_hash("TapLeaf", &data)
}

/// BIP-341 branch hash: children are sorted lexicographically
pub fn tap_branch_hash(left: [u8; 32], right: [u8; 32]) -> [u8; 32] {
    let mut data = Vec::with_capacity(64);
    if left <= right {
        data.extend_from_slice(&left);
        data.extend_from_slice(&right);
    } else {
        data.extend_from_slice(&right);
        data.extend_from_slice(&left);
    }
    tagged_hash("TapBranch", &data)
}

/// Taproot script tree: miniscript leaves at the bottom, `{left,right}`
/// pairs above
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TapTree {
    Leaf(Box<Miniscript>),
    Branch(Box<TapTree>, Box<TapTree>),
}

impl TapTree {
    /// Parses `{A,B}` pairs recursively; a bare miniscript is a single leaf
    pub fn read_from(cursor: &mut Cursor) -> Result<TapTree, miniscript::Error> {
        if cursor.eat(b'{') {
            let left = TapTree::read_from(cursor)?;
            if !cursor.eat(b',') {
                return Err(miniscript::Error::Expected(cursor.position(), ','));
            }
            let right = TapTree::read_from(cursor)?;
            if !cursor.eat(b'}') {
                return Err(miniscript::Error::Expected(cursor.position(), '}'));
            }
            return Ok(TapTree::Branch(Box::new(left), Box::new(right)));
        }
        Ok(TapTree::Leaf(Box::new(Miniscript::read_from(cursor)?)))
    }

    /// Merkle root committing to all leaves
    pub fn merkle_root(&self) -> [u8; 32] {
        match self {
            TapTree::Leaf(ms) => tap_leaf_hash(&ms.compile()),
            TapTree::Branch(left, right) => {
                tap_branch_hash(left.merkle_root(), right.merkle_root())
            }
        }
    }

    /// All leaves with their tapleaf hash and merkle path (sibling hashes
    /// from the leaf towards the root), as needed for control blocks
    pub fn leaves(&self) -> Vec<TapLeaf> {
        match self {
            TapTree::Leaf(ms) => {
                let script = ms.compile();
                let leaf_hash = tap_leaf_hash(&script);
                vec![TapLeaf {
                    miniscript: ms,
                    script,
                    leaf_hash,
                    merkle_path: vec![],
                }]
            }
            TapTree::Branch(left, right) => {
                let left_root = left.merkle_root();
                let right_root = right.merkle_root();
                let mut leaves = left.leaves();
                for leaf in &mut leaves {
                    leaf.merkle_path.push(right_root);
                }
                let mut right_leaves = right.leaves();
                for leaf in &mut right_leaves {
                    leaf.merkle_path.push(left_root);
                }
                leaves.extend(right_leaves);
                leaves
            }
        }
    }

    pub fn keys(&self) -> Vec<&Key> {
        match self {
            TapTree::Leaf(ms) => ms.keys(),
            TapTree::Branch(left, right) => {
                let mut keys = left.keys();
                keys.extend(right.keys());
                keys
            }
        }
    }

    pub fn derive(
        &self,
        index: u32,
        branch_index: Option<u32>,
    ) -> Result<TapTree, miniscript::Error> {
        Ok(match self {
            TapTree::Leaf(ms) => TapTree::Leaf(Box::new(ms.derive(index, branch_index)?)),
            TapTree::Branch(left, right) => TapTree::Branch(
                Box::new(left.derive(index, branch_index)?),
                Box::new(right.derive(index, branch_index)?),
            ),
        })
    }

    /// Type-checks every leaf
    pub fn verify(&self) -> Result<(), miniscript::Error> {
        match self {
            TapTree::Leaf(ms) => ms.verify(),
            TapTree::Branch(left, right) => {
                left.verify()?;
                right.verify()
            }
        }
    }
}

/// A tapscript leaf extracted from the tree
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TapLeaf<'a> {
    pub miniscript: &'a Miniscript,
    pub script: Vec<u8>,
    pub leaf_hash: [u8; 32],
    /// Sibling hashes from the leaf to the root
    pub merkle_path: Vec<[u8; 32]>,
}

impl Display for TapTree {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TapTree::Leaf(ms) => write!(f, "{}", ms),
            TapTree::Branch(left, right) => write!(f, "{{{},{}}}", left, right),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PK_A: &str = "b4ca2da5380d9aeb5ca67e4f18c487ae9b668748517e12b788496f63765e2efa";
    const PK_B: &str = "e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130";
    const PK_C: &str = "0e0338c96a8870479f2396c373cc7696ba124e8635d41b0ea581112b67817261";

    fn tree(source: &str) -> TapTree {
        let mut cursor = Cursor::new(source.as_bytes());
        let tree = TapTree::read_from(&mut cursor).unwrap();
        assert!(cursor.is_empty());
        tree
    }

    #[test]
    fn parse_display_roundtrip() {
        for source in &[
            format!("pk({})", PK_A),
            format!("{{pk({}),pk({})}}", PK_A, PK_B),
            format!("{{{{pk({}),pk({})}},pk({})}}", PK_A, PK_B, PK_C),
        ] {
            assert_eq!(&tree(source).to_string(), source);
        }
    }

    #[test]
    fn leaf_hash_is_tagged() {
        let t = tree(&format!("pk({})", PK_A));
        let script = match &t {
            TapTree::Leaf(ms) => ms.compile(),
            _ => unreachable!(),
        };
        let mut manual = vec![TAPROOT_LEAF_VERSION, script.len() as u8];
        manual.extend_from_slice(&script);
        assert_eq!(t.merkle_root(), tagged_hash("TapLeaf", &manual));
    }

    #[test]
    fn branch_hash_is_ordered() {
        let a = [0x01u8; 32];
        let b = [0x02u8; 32];
        assert_eq!(tap_branch_hash(a, b), tap_branch_hash(b, a));
    }

    #[test]
    fn merkle_paths() {
        let t = tree(&format!(
            "{{{{pk({}),pk({})}},pk({})}}",
            PK_A, PK_B, PK_C
        ));
        let leaves = t.leaves();
        assert_eq!(leaves.len(), 3);
        // left-most leaf: sibling is the B leaf, then the C leaf hash
        assert_eq!(leaves[0].merkle_path.len(), 2);
        assert_eq!(leaves[2].merkle_path.len(), 1);

        // recomputing the root from each leaf + path must succeed
        for leaf in &leaves {
            let mut node = leaf.leaf_hash;
            for sibling in &leaf.merkle_path {
                node = tap_branch_hash(node, *sibling);
            }
            assert_eq!(node, t.merkle_root());
        }
    }
}
