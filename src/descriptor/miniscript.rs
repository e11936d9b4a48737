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

//! Miniscript: the typed algebra of Bitcoin Script fragments. Each node
//! carries a base correctness type (`B`, `V`, `K` or `W`) and the
//! `z/o/n/d/u` modifier set computed compositionally; [`Miniscript::verify`]
//! rejects type-unsound compositions and [`Miniscript::compile`] emits the
//! canonical script bytes.
//!
//! `pk`/`pkh` are kept distinct from their `c:pk_k`/`c:pk_h` desugarings so
//! that descriptor strings round-trip verbatim.

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

use super::arguments::{self, Key, KeyHash, Number, Raw20, Raw32};
use super::lex::Cursor;
use crate::script::op;

/// Miniscript correctness base types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, Display)]
#[display(Debug)]
pub enum Base {
    B,
    V,
    K,
    W,
}

/// Correctness type of a node: base plus modifier flags
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct MsType {
    pub base: Base,
    /// Consumes exactly zero stack elements
    pub z: bool,
    /// Consumes exactly one stack element
    pub o: bool,
    /// Consumes at least one element, the first of which is non-zero
    pub n: bool,
    /// Dissatisfiable without satisfying any condition
    pub d: bool,
    /// When satisfied, leaves exactly 1 on the stack
    pub u: bool,
}

impl MsType {
    fn new(base: Base) -> MsType {
        MsType {
            base,
            z: false,
            o: false,
            n: false,
            d: false,
            u: false,
        }
    }
}

impl Display for MsType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base)?;
        for (flag, ch) in &[
            (self.z, 'z'),
            (self.o, 'o'),
            (self.n, 'n'),
            (self.d, 'd'),
            (self.u, 'u'),
        ] {
            if *flag {
                write!(f, "{}", ch)?;
            }
        }
        Ok(())
    }
}

/// Miniscript processing errors
#[derive(Clone, PartialEq, Eq, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// unknown fragment name '{0}'
    UnknownFragment(String),

    /// unknown wrapper character '{0}'
    UnknownWrapper(char),

    /// unexpected character at position {0}, expected '{1}'
    Expected(usize, char),

    /// fragment '{0}' has wrong number of arguments
    BadArity(String),

    /// type error in fragment '{0}': {1}
    Type(String, String),

    /// multisig threshold {0} of {1} is out of the supported range
    BadThreshold(u32, usize),

    /// top-level miniscript must be of base type B, found {0}
    NonTopLevelB(Base),

    /// argument error: {0}
    #[from]
    Argument(arguments::Error),
}

/// Miniscript AST node
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Miniscript {
    /// `pk(KEY)` - sugar for `c:pk_k`
    Pk(Key),
    /// `pkh(KEYHASH)` - sugar for `c:pk_h`
    Pkh(KeyHash),
    /// `pk_k(KEY)`
    PkK(Key),
    /// `pk_h(KEYHASH)`
    PkH(KeyHash),
    /// `older(N)` - CHECKSEQUENCEVERIFY
    Older(Number),
    /// `after(N)` - CHECKLOCKTIMEVERIFY
    After(Number),
    Sha256(Raw32),
    Hash256(Raw32),
    Ripemd160(Raw20),
    Hash160(Raw20),
    /// `andor(X,Y,Z)` - if X then Y else Z
    AndOr(Box<Miniscript>, Box<Miniscript>, Box<Miniscript>),
    AndV(Box<Miniscript>, Box<Miniscript>),
    AndB(Box<Miniscript>, Box<Miniscript>),
    OrB(Box<Miniscript>, Box<Miniscript>),
    OrC(Box<Miniscript>, Box<Miniscript>),
    OrD(Box<Miniscript>, Box<Miniscript>),
    OrI(Box<Miniscript>, Box<Miniscript>),
    Thresh(Number, Vec<Miniscript>),
    Multi(Number, Vec<Key>),
    SortedMulti(Number, Vec<Key>),
    MultiA(Number, Vec<Key>),
    SortedMultiA(Number, Vec<Key>),
    // wrappers
    A(Box<Miniscript>),
    S(Box<Miniscript>),
    C(Box<Miniscript>),
    T(Box<Miniscript>),
    D(Box<Miniscript>),
    V(Box<Miniscript>),
    J(Box<Miniscript>),
    N(Box<Miniscript>),
    L(Box<Miniscript>),
    U(Box<Miniscript>),
}

use Miniscript::*;

impl Miniscript {
    /// Fragment name for error reporting
    fn name(&self) -> &'static str {
        match self {
            Pk(_) => "pk",
            Pkh(_) => "pkh",
            PkK(_) => "pk_k",
            PkH(_) => "pk_h",
            Older(_) => "older",
            After(_) => "after",
            Sha256(_) => "sha256",
            Hash256(_) => "hash256",
            Ripemd160(_) => "ripemd160",
            Hash160(_) => "hash160",
            AndOr(..) => "andor",
            AndV(..) => "and_v",
            AndB(..) => "and_b",
            OrB(..) => "or_b",
            OrC(..) => "or_c",
            OrD(..) => "or_d",
            OrI(..) => "or_i",
            Thresh(..) => "thresh",
            Multi(..) => "multi",
            SortedMulti(..) => "sortedmulti",
            MultiA(..) => "multi_a",
            SortedMultiA(..) => "sortedmulti_a",
            A(_) => "a",
            S(_) => "s",
            C(_) => "c",
            T(_) => "t",
            D(_) => "d",
            V(_) => "v",
            J(_) => "j",
            N(_) => "n",
            L(_) => "l",
            U(_) => "u",
        }
    }

    fn type_error(&self, message: &str) -> Error {
        Error::Type(self.name().to_string(), message.to_string())
    }

    /// Computes the correctness type, verifying all children
    pub fn ms_type(&self) -> Result<MsType, Error> {
        let mut ty;
        match self {
            PkK(_) => {
                ty = MsType::new(Base::K);
                ty.o = true;
                ty.n = true;
                ty.d = true;
                ty.u = true;
            }
            PkH(_) => {
                ty = MsType::new(Base::K);
                ty.n = true;
                ty.d = true;
                ty.u = true;
            }
            Pk(_) => {
                // c:pk_k
                ty = MsType::new(Base::B);
                ty.o = true;
                ty.n = true;
                ty.d = true;
                ty.u = true;
            }
            Pkh(_) => {
                // c:pk_h
                ty = MsType::new(Base::B);
                ty.n = true;
                ty.d = true;
                ty.u = true;
            }
            Older(n) | After(n) => {
                if n.0 == 0 || n.0 >= 0x8000_0000 {
                    return Err(self.type_error("timelock value out of range"));
                }
                ty = MsType::new(Base::B);
                ty.z = true;
            }
            Sha256(_) | Hash256(_) | Ripemd160(_) | Hash160(_) => {
                ty = MsType::new(Base::B);
                ty.o = true;
                ty.n = true;
                ty.d = true;
                ty.u = true;
            }
            AndOr(x, y, z) => {
                let tx = x.ms_type()?;
                let ty_ = y.ms_type()?;
                let tz = z.ms_type()?;
                if tx.base != Base::B || !tx.d || !tx.u {
                    return Err(self.type_error("X must be Bdu"));
                }
                if ty_.base != tz.base || !matches!(ty_.base, Base::B | Base::K | Base::V) {
                    return Err(self.type_error("Y and Z must share a B/K/V base"));
                }
                ty = MsType::new(ty_.base);
                ty.z = tx.z && ty_.z && tz.z;
                ty.o = (tx.z && ty_.o && tz.o) || (tx.o && ty_.z && tz.z);
                ty.u = ty_.u && tz.u;
                ty.d = tz.d;
            }
            AndV(x, y) => {
                let tx = x.ms_type()?;
                let ty_ = y.ms_type()?;
                if tx.base != Base::V {
                    return Err(self.type_error("X must be V"));
                }
                if !matches!(ty_.base, Base::B | Base::K | Base::V) {
                    return Err(self.type_error("Y must be B, K or V"));
                }
                ty = MsType::new(ty_.base);
                ty.z = tx.z && ty_.z;
                ty.o = (tx.z && ty_.o) || (tx.o && ty_.z);
                ty.n = tx.n || (tx.z && ty_.n);
                ty.u = ty_.u;
            }
            AndB(x, y) => {
                let tx = x.ms_type()?;
                let ty_ = y.ms_type()?;
                if tx.base != Base::B || ty_.base != Base::W {
                    return Err(self.type_error("and_b requires B and W"));
                }
                ty = MsType::new(Base::B);
                ty.z = tx.z && ty_.z;
                ty.o = (tx.z && ty_.o) || (tx.o && ty_.z);
                ty.n = tx.n || (tx.z && ty_.n);
                ty.d = tx.d && ty_.d;
                ty.u = true;
            }
            OrB(x, z) => {
                let tx = x.ms_type()?;
                let tz = z.ms_type()?;
                if tx.base != Base::B || !tx.d {
                    return Err(self.type_error("X must be Bd"));
                }
                if tz.base != Base::W || !tz.d {
                    return Err(self.type_error("Z must be Wd"));
                }
                ty = MsType::new(Base::B);
                ty.z = tx.z && tz.z;
                ty.o = (tx.z && tz.o) || (tx.o && tz.z);
                ty.d = true;
                ty.u = true;
            }
            OrC(x, z) => {
                let tx = x.ms_type()?;
                let tz = z.ms_type()?;
                if tx.base != Base::B || !tx.d || !tx.u {
                    return Err(self.type_error("X must be Bdu"));
                }
                if tz.base != Base::V {
                    return Err(self.type_error("Z must be V"));
                }
                ty = MsType::new(Base::V);
                ty.z = tx.z && tz.z;
                ty.o = tx.o && tz.z;
            }
            OrD(x, z) => {
                let tx = x.ms_type()?;
                let tz = z.ms_type()?;
                if tx.base != Base::B || !tx.d || !tx.u {
                    return Err(self.type_error("X must be Bdu"));
                }
                if tz.base != Base::B {
                    return Err(self.type_error("Z must be B"));
                }
                ty = MsType::new(Base::B);
                ty.z = tx.z && tz.z;
                ty.o = tx.o && tz.z;
                ty.d = tz.d;
                ty.u = tz.u;
            }
            OrI(x, z) => {
                let tx = x.ms_type()?;
                let tz = z.ms_type()?;
                if tx.base != tz.base || !matches!(tx.base, Base::B | Base::K | Base::V) {
                    return Err(self.type_error("X and Z must share a B/K/V base"));
                }
                ty = MsType::new(tx.base);
                ty.o = tx.z && tz.z;
                ty.u = tx.u && tz.u;
                ty.d = tx.d || tz.d;
            }
            Thresh(k, subs) => {
                if k.0 == 0 || k.0 as usize > subs.len() {
                    return Err(Error::BadThreshold(k.0, subs.len()));
                }
                let mut all_z = true;
                let mut count_o = 0;
                for (i, sub) in subs.iter().enumerate() {
                    let ts = sub.ms_type()?;
                    let expected = if i == 0 { Base::B } else { Base::W };
                    if ts.base != expected || !ts.d || !ts.u {
                        return Err(self.type_error("children must be Bdu/Wdu"));
                    }
                    if !ts.z {
                        all_z = false;
                        if ts.o {
                            count_o += 1;
                        } else {
                            count_o += 2; // disqualifies the o property
                        }
                    }
                }
                ty = MsType::new(Base::B);
                ty.z = all_z;
                ty.o = count_o == 1;
                ty.d = true;
                ty.u = true;
            }
            Multi(k, keys) | SortedMulti(k, keys) => {
                if k.0 == 0 || k.0 as usize > keys.len() || keys.len() > 16 {
                    return Err(Error::BadThreshold(k.0, keys.len()));
                }
                ty = MsType::new(Base::B);
                ty.n = true;
                ty.d = true;
                ty.u = true;
            }
            MultiA(k, keys) | SortedMultiA(k, keys) => {
                if k.0 == 0 || k.0 as usize > keys.len() || keys.len() > 16 {
                    return Err(Error::BadThreshold(k.0, keys.len()));
                }
                ty = MsType::new(Base::B);
                ty.d = true;
                ty.u = true;
            }
            A(x) => {
                let tx = x.ms_type()?;
                if tx.base != Base::B {
                    return Err(self.type_error("X must be B"));
                }
                ty = MsType::new(Base::W);
                ty.d = tx.d;
                ty.u = tx.u;
            }
            S(x) => {
                let tx = x.ms_type()?;
                if tx.base != Base::B || !tx.o {
                    return Err(self.type_error("X must be Bo"));
                }
                ty = MsType::new(Base::W);
                ty.d = tx.d;
                ty.u = tx.u;
            }
            C(x) => {
                let tx = x.ms_type()?;
                if tx.base != Base::K {
                    return Err(self.type_error("X must be K"));
                }
                ty = MsType::new(Base::B);
                ty.o = tx.o;
                ty.n = tx.n;
                ty.d = tx.d;
                ty.u = true;
            }
            T(x) => {
                let tx = x.ms_type()?;
                if tx.base != Base::V {
                    return Err(self.type_error("X must be V"));
                }
                ty = MsType::new(Base::B);
                ty.z = tx.z;
                ty.o = tx.o;
                ty.n = tx.n;
                ty.u = true;
            }
            D(x) => {
                let tx = x.ms_type()?;
                if tx.base != Base::V || !tx.z {
                    return Err(self.type_error("X must be Vz"));
                }
                ty = MsType::new(Base::B);
                ty.o = true;
                ty.n = true;
                ty.d = true;
                // the condition bit is minimal under MINIMALIF rules
                ty.u = true;
            }
            V(x) => {
                let tx = x.ms_type()?;
                if tx.base != Base::B {
                    return Err(self.type_error("X must be B"));
                }
                ty = MsType::new(Base::V);
                ty.z = tx.z;
                ty.o = tx.o;
                ty.n = tx.n;
            }
            J(x) => {
                let tx = x.ms_type()?;
                if tx.base != Base::B || !tx.n {
                    return Err(self.type_error("X must be Bn"));
                }
                ty = MsType::new(Base::B);
                ty.o = tx.o;
                ty.n = true;
                ty.d = true;
                ty.u = tx.u;
            }
            N(x) => {
                let tx = x.ms_type()?;
                if tx.base != Base::B {
                    return Err(self.type_error("X must be B"));
                }
                ty = tx;
                ty.u = true;
            }
            L(x) | U(x) => {
                let tx = x.ms_type()?;
                if tx.base != Base::B {
                    return Err(self.type_error("X must be B"));
                }
                ty = MsType::new(Base::B);
                ty.o = tx.z;
                ty.d = true;
                ty.u = tx.u;
            }
        }
        Ok(ty)
    }

    /// Verifies that the node is a valid top-level (`B`-typed) miniscript
    pub fn verify(&self) -> Result<(), Error> {
        let ty = self.ms_type()?;
        if ty.base != Base::B {
            return Err(Error::NonTopLevelB(ty.base));
        }
        Ok(())
    }

    /// Keys referenced by the tree, in source order
    pub fn keys(&self) -> Vec<&Key> {
        let mut keys = vec![];
        self.collect_keys(&mut keys);
        keys
    }

    fn collect_keys<'a>(&'a self, keys: &mut Vec<&'a Key>) {
        match self {
            Pk(key) | PkK(key) => keys.push(key),
            Pkh(kh) | PkH(kh) => {
                if let Some(key) = kh.key() {
                    keys.push(key)
                }
            }
            Multi(_, ks) | SortedMulti(_, ks) | MultiA(_, ks) | SortedMultiA(_, ks) => {
                keys.extend(ks.iter())
            }
            Older(_) | After(_) | Sha256(_) | Hash256(_) | Ripemd160(_) | Hash160(_) => {}
            AndOr(x, y, z) => {
                x.collect_keys(keys);
                y.collect_keys(keys);
                z.collect_keys(keys);
            }
            AndV(x, y) | AndB(x, y) | OrB(x, y) | OrC(x, y) | OrD(x, y) | OrI(x, y) => {
                x.collect_keys(keys);
                y.collect_keys(keys);
            }
            Thresh(_, subs) => {
                for sub in subs {
                    sub.collect_keys(keys)
                }
            }
            A(x) | S(x) | C(x) | T(x) | D(x) | V(x) | J(x) | N(x) | L(x) | U(x) => {
                x.collect_keys(keys)
            }
        }
    }

    /// Substitutes wildcard/branch templates in every key
    pub fn derive(&self, index: u32, branch_index: Option<u32>) -> Result<Miniscript, Error> {
        let derive_keys = |keys: &[Key]| -> Result<Vec<Key>, Error> {
            keys.iter()
                .map(|k| k.derive(index, branch_index).map_err(Error::from))
                .collect()
        };
        Ok(match self {
            Pk(key) => Pk(key.derive(index, branch_index)?),
            PkK(key) => PkK(key.derive(index, branch_index)?),
            Pkh(kh) => Pkh(kh.derive(index, branch_index)?),
            PkH(kh) => PkH(kh.derive(index, branch_index)?),
            Older(n) => Older(*n),
            After(n) => After(*n),
            Sha256(h) => Sha256(*h),
            Hash256(h) => Hash256(*h),
            Ripemd160(h) => Ripemd160(*h),
            Hash160(h) => Hash160(*h),
            AndOr(x, y, z) => AndOr(
                Box::new(x.derive(index, branch_index)?),
                Box::new(y.derive(index, branch_index)?),
                Box::new(z.derive(index, branch_index)?),
            ),
            AndV(x, y) => AndV(
                Box::new(x.derive(index, branch_index)?),
                Box::new(y.derive(index, branch_index)?),
            ),
            AndB(x, y) => AndB(
                Box::new(x.derive(index, branch_index)?),
                Box::new(y.derive(index, branch_index)?),
            ),
            OrB(x, y) => OrB(
                Box::new(x.derive(index, branch_index)?),
                Box::new(y.derive(index, branch_index)?),
            ),
            OrC(x, y) => OrC(
                Box::new(x.derive(index, branch_index)?),
                Box::new(y.derive(index, branch_index)?),
            ),
            OrD(x, y) => OrD(
                Box::new(x.derive(index, branch_index)?),
                Box::new(y.derive(index, branch_index)?),
            ),
            OrI(x, y) => OrI(
                Box::new(x.derive(index, branch_index)?),
                Box::new(y.derive(index, branch_index)?),
            ),
            Thresh(k, subs) => Thresh(
                *k,
                subs.iter()
                    .map(|s| s.derive(index, branch_index))
                    .collect::<Result<_, _>>()?,
            ),
            Multi(k, keys) => Multi(*k, derive_keys(keys)?),
            SortedMulti(k, keys) => SortedMulti(*k, derive_keys(keys)?),
            MultiA(k, keys) => MultiA(*k, derive_keys(keys)?),
            SortedMultiA(k, keys) => SortedMultiA(*k, derive_keys(keys)?),
            A(x) => A(Box::new(x.derive(index, branch_index)?)),
            S(x) => S(Box::new(x.derive(index, branch_index)?)),
            C(x) => C(Box::new(x.derive(index, branch_index)?)),
            T(x) => T(Box::new(x.derive(index, branch_index)?)),
            D(x) => D(Box::new(x.derive(index, branch_index)?)),
            V(x) => V(Box::new(x.derive(index, branch_index)?)),
            J(x) => J(Box::new(x.derive(index, branch_index)?)),
            N(x) => N(Box::new(x.derive(index, branch_index)?)),
            L(x) => L(Box::new(x.derive(index, branch_index)?)),
            U(x) => U(Box::new(x.derive(index, branch_index)?)),
        })
    }

    /// Whether the compiled script ends with an opcode that has a VERIFY
    /// form (`EQUAL`, `CHECKSIG`, `CHECKMULTISIG`, `NUMEQUAL`)
    fn ends_mergeable(&self) -> bool {
        match self {
            Pk(_) | Pkh(_) | C(_) => true,
            Multi(..) | SortedMulti(..) => true,
            MultiA(..) | SortedMultiA(..) => true,
            Thresh(..) => true,
            Sha256(_) | Hash256(_) | Ripemd160(_) | Hash160(_) => true,
            _ => false,
        }
    }

    /// Compiles the node to script bytes
    pub fn compile(&self) -> Vec<u8> {
        let mut script = vec![];
        self.compile_into(&mut script);
        script
    }

    fn compile_into(&self, script: &mut Vec<u8>) {
        match self {
            Pk(key) => {
                script.extend_from_slice(&key.compile());
                script.push(op::OP_CHECKSIG);
            }
            Pkh(kh) => {
                script.extend_from_slice(&[op::OP_DUP, op::OP_HASH160]);
                script.extend_from_slice(&kh.compile());
                script.extend_from_slice(&[op::OP_EQUALVERIFY, op::OP_CHECKSIG]);
            }
            PkK(key) => script.extend_from_slice(&key.compile()),
            PkH(kh) => {
                script.extend_from_slice(&[op::OP_DUP, op::OP_HASH160]);
                script.extend_from_slice(&kh.compile());
                script.push(op::OP_EQUALVERIFY);
            }
            Older(n) => {
                script.extend_from_slice(&n.compile());
                script.push(op::OP_CHECKSEQUENCEVERIFY);
            }
            After(n) => {
                script.extend_from_slice(&n.compile());
                script.push(op::OP_CHECKLOCKTIMEVERIFY);
            }
            Sha256(h) => {
                script.extend_from_slice(&[op::OP_SIZE, 0x01, 0x20, op::OP_EQUALVERIFY, op::OP_SHA256]);
                script.extend_from_slice(&h.compile());
                script.push(op::OP_EQUAL);
            }
            Hash256(h) => {
                script.extend_from_slice(&[op::OP_SIZE, 0x01, 0x20, op::OP_EQUALVERIFY, op::OP_HASH256]);
                script.extend_from_slice(&h.compile());
                script.push(op::OP_EQUAL);
            }
            Ripemd160(h) => {
                script.extend_from_slice(&[op::OP_SIZE, 0x01, 0x20, op::OP_EQUALVERIFY, op::OP_RIPEMD160]);
                script.extend_from_slice(&h.compile());
                script.push(op::OP_EQUAL);
            }
            Hash160(h) => {
                script.extend_from_slice(&[op::OP_SIZE, 0x01, 0x20, op::OP_EQUALVERIFY, op::OP_HASH160]);
                script.extend_from_slice(&h.compile());
                script.push(op::OP_EQUAL);
            }
            AndOr(x, y, z) => {
                x.compile_into(script);
                script.push(op::OP_NOTIF);
                z.compile_into(script);
                script.push(op::OP_ELSE);
                y.compile_into(script);
                script.push(op::OP_ENDIF);
            }
            AndV(x, y) => {
                x.compile_into(script);
                y.compile_into(script);
            }
            AndB(x, y) => {
                x.compile_into(script);
                y.compile_into(script);
                script.push(op::OP_BOOLAND);
            }
            OrB(x, z) => {
                x.compile_into(script);
                z.compile_into(script);
                script.push(op::OP_BOOLOR);
            }
            OrC(x, z) => {
                x.compile_into(script);
                script.push(op::OP_NOTIF);
                z.compile_into(script);
                script.push(op::OP_ENDIF);
            }
            OrD(x, z) => {
                x.compile_into(script);
                script.extend_from_slice(&[op::OP_IFDUP, op::OP_NOTIF]);
                z.compile_into(script);
                script.push(op::OP_ENDIF);
            }
            OrI(x, z) => {
                script.push(op::OP_IF);
                x.compile_into(script);
                script.push(op::OP_ELSE);
                z.compile_into(script);
                script.push(op::OP_ENDIF);
            }
            Thresh(k, subs) => {
                for (i, sub) in subs.iter().enumerate() {
                    sub.compile_into(script);
                    if i > 0 {
                        script.push(op::OP_ADD);
                    }
                }
                script.extend_from_slice(&k.compile());
                script.push(op::OP_EQUAL);
            }
            Multi(k, keys) => {
                script.extend_from_slice(&k.compile());
                for key in keys {
                    script.extend_from_slice(&key.compile());
                }
                script.extend_from_slice(&Number(keys.len() as u32).compile());
                script.push(op::OP_CHECKMULTISIG);
            }
            SortedMulti(k, keys) => {
                let mut sorted: Vec<&Key> = keys.iter().collect();
                sorted.sort_by_key(|key| key.sec());
                script.extend_from_slice(&k.compile());
                for key in sorted {
                    script.extend_from_slice(&key.compile());
                }
                script.extend_from_slice(&Number(keys.len() as u32).compile());
                script.push(op::OP_CHECKMULTISIG);
            }
            MultiA(k, keys) => {
                for (i, key) in keys.iter().enumerate() {
                    script.extend_from_slice(&key.compile());
                    script.push(if i == 0 {
                        op::OP_CHECKSIG
                    } else {
                        op::OP_CHECKSIGADD
                    });
                }
                script.extend_from_slice(&k.compile());
                script.push(op::OP_NUMEQUAL);
            }
            SortedMultiA(k, keys) => {
                let mut sorted: Vec<&Key> = keys.iter().collect();
                sorted.sort_by_key(|key| key.sec());
                for (i, key) in sorted.iter().enumerate() {
                    script.extend_from_slice(&key.compile());
                    script.push(if i == 0 {
                        op::OP_CHECKSIG
                    } else {
                        op::OP_CHECKSIGADD
                    });
                }
                script.extend_from_slice(&k.compile());
                script.push(op::OP_NUMEQUAL);
            }
            A(x) => {
                script.push(op::OP_TOALTSTACK);
                x.compile_into(script);
                script.push(op::OP_FROMALTSTACK);
            }
            S(x) => {
                script.push(op::OP_SWAP);
                x.compile_into(script);
            }
            C(x) => {
                x.compile_into(script);
                script.push(op::OP_CHECKSIG);
            }
            T(x) => {
                x.compile_into(script);
                script.push(op::OP_1);
            }
            D(x) => {
                script.extend_from_slice(&[op::OP_DUP, op::OP_IF]);
                x.compile_into(script);
                script.push(op::OP_ENDIF);
            }
            V(x) => {
                x.compile_into(script);
                if x.ends_mergeable() {
                    let last = script.last_mut().expect("compiled fragments are non-empty");
                    *last = match *last {
                        op::OP_EQUAL => op::OP_EQUALVERIFY,
                        op::OP_CHECKSIG => op::OP_CHECKSIGVERIFY,
                        op::OP_CHECKMULTISIG => op::OP_CHECKMULTISIGVERIFY,
                        op::OP_NUMEQUAL => op::OP_NUMEQUALVERIFY,
                        other => other,
                    };
                } else {
                    script.push(op::OP_VERIFY);
                }
            }
            J(x) => {
                script.extend_from_slice(&[op::OP_SIZE, op::OP_0NOTEQUAL, op::OP_IF]);
                x.compile_into(script);
                script.push(op::OP_ENDIF);
            }
            N(x) => {
                x.compile_into(script);
                script.push(op::OP_0NOTEQUAL);
            }
            L(x) => {
                script.extend_from_slice(&[op::OP_IF, op::OP_0, op::OP_ELSE]);
                x.compile_into(script);
                script.push(op::OP_ENDIF);
            }
            U(x) => {
                script.push(op::OP_IF);
                x.compile_into(script);
                script.extend_from_slice(&[op::OP_ELSE, op::OP_0, op::OP_ENDIF]);
            }
        }
    }

    /// Length of the compiled script, computed without materializing it
    pub fn script_len(&self) -> usize {
        match self {
            Pk(key) => key.compile().len() + 1,
            Pkh(kh) => kh.compile().len() + 4,
            PkK(key) => key.compile().len(),
            PkH(kh) => kh.compile().len() + 3,
            Older(n) | After(n) => n.compiled_len() + 1,
            Sha256(_) | Hash256(_) => 5 + 33 + 1,
            Ripemd160(_) | Hash160(_) => 5 + 21 + 1,
            AndOr(x, y, z) => x.script_len() + y.script_len() + z.script_len() + 3,
            AndV(x, y) => x.script_len() + y.script_len(),
            AndB(x, y) | OrB(x, y) => x.script_len() + y.script_len() + 1,
            OrC(x, z) => x.script_len() + z.script_len() + 2,
            OrD(x, z) => x.script_len() + z.script_len() + 3,
            OrI(x, z) => x.script_len() + z.script_len() + 3,
            Thresh(k, subs) => {
                subs.iter().map(Miniscript::script_len).sum::<usize>()
                    + subs.len() - 1
                    + k.compiled_len()
                    + 1
            }
            Multi(k, keys) | SortedMulti(k, keys) => {
                k.compiled_len()
                    + keys.iter().map(|key| key.compile().len()).sum::<usize>()
                    + Number(keys.len() as u32).compiled_len()
                    + 1
            }
            MultiA(k, keys) | SortedMultiA(k, keys) => {
                keys.iter().map(|key| key.compile().len()).sum::<usize>()
                    + keys.len()
                    + k.compiled_len()
                    + 1
            }
            A(x) => x.script_len() + 2,
            S(x) | C(x) | T(x) | N(x) => x.script_len() + 1,
            D(x) => x.script_len() + 3,
            V(x) => x.script_len() + if x.ends_mergeable() { 0 } else { 1 },
            J(x) => x.script_len() + 4,
            L(x) | U(x) => x.script_len() + 4,
        }
    }

    /// Parses a miniscript expression from descriptor text
    pub fn read_from(cursor: &mut Cursor) -> Result<Miniscript, Error> {
        let (name, delim) = cursor.read_until(b"(");
        if delim.is_none() {
            return Err(Error::Expected(cursor.position(), '('));
        }
        let name = core::str::from_utf8(name)
            .map_err(|_| Error::UnknownFragment("<non-ascii>".to_string()))?;

        let (wrappers, base_name) = match name.rfind(':') {
            Some(pos) => {
                let (wrappers, rest) = name.split_at(pos);
                if wrappers.contains(':') {
                    return Err(Error::UnknownFragment(name.to_string()));
                }
                (wrappers, &rest[1..])
            }
            None => ("", name),
        };

        let mut node = Self::read_base(base_name, cursor)?;
        if !cursor.eat(b')') {
            return Err(Error::Expected(cursor.position(), ')'));
        }
        for wrapper in wrappers.chars().rev() {
            node = match wrapper {
                'a' => A(Box::new(node)),
                's' => S(Box::new(node)),
                'c' => C(Box::new(node)),
                't' => T(Box::new(node)),
                'd' => D(Box::new(node)),
                'v' => V(Box::new(node)),
                'j' => J(Box::new(node)),
                'n' => N(Box::new(node)),
                'l' => L(Box::new(node)),
                'u' => U(Box::new(node)),
                other => return Err(Error::UnknownWrapper(other)),
            };
        }
        Ok(node)
    }

    fn read_base(name: &str, cursor: &mut Cursor) -> Result<Miniscript, Error> {
        Ok(match name {
            "pk" => Pk(Key::read_from(cursor)?),
            "pkh" => Pkh(KeyHash::read_from(cursor)?),
            "pk_k" => PkK(Key::read_from(cursor)?),
            "pk_h" => PkH(KeyHash::read_from(cursor)?),
            "older" => Older(Number::read_from(cursor)?),
            "after" => After(Number::read_from(cursor)?),
            "sha256" => Sha256(Raw32::read_from(cursor)?),
            "hash256" => Hash256(Raw32::read_from(cursor)?),
            "ripemd160" => Ripemd160(Raw20::read_from(cursor)?),
            "hash160" => Hash160(Raw20::read_from(cursor)?),
            "andor" => {
                let x = Self::read_from(cursor)?;
                Self::expect(cursor, b',')?;
                let y = Self::read_from(cursor)?;
                Self::expect(cursor, b',')?;
                let z = Self::read_from(cursor)?;
                AndOr(Box::new(x), Box::new(y), Box::new(z))
            }
            "and_v" | "and_b" | "or_b" | "or_c" | "or_d" | "or_i" => {
                let x = Self::read_from(cursor)?;
                Self::expect(cursor, b',')?;
                let y = Self::read_from(cursor)?;
                match name {
                    "and_v" => AndV(Box::new(x), Box::new(y)),
                    "and_b" => AndB(Box::new(x), Box::new(y)),
                    "or_b" => OrB(Box::new(x), Box::new(y)),
                    "or_c" => OrC(Box::new(x), Box::new(y)),
                    "or_d" => OrD(Box::new(x), Box::new(y)),
                    _ => OrI(Box::new(x), Box::new(y)),
                }
            }
            "thresh" => {
                let k = Number::read_from(cursor)?;
                let mut subs = vec![];
                while cursor.eat(b',') {
                    subs.push(Self::read_from(cursor)?);
                }
                Thresh(k, subs)
            }
            "multi" | "sortedmulti" | "multi_a" | "sortedmulti_a" => {
                let k = Number::read_from(cursor)?;
                let mut keys = vec![];
                while cursor.eat(b',') {
                    keys.push(Key::read_from(cursor)?);
                }
                match name {
                    "multi" => Multi(k, keys),
                    "sortedmulti" => SortedMulti(k, keys),
                    "multi_a" => MultiA(k, keys),
                    _ => SortedMultiA(k, keys),
                }
            }
            other => return Err(Error::UnknownFragment(other.to_string())),
        })
    }

    fn expect(cursor: &mut Cursor, byte: u8) -> Result<(), Error> {
        if !cursor.eat(byte) {
            return Err(Error::Expected(cursor.position(), byte as char));
        }
        Ok(())
    }

    fn fmt_args(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Pk(key) | PkK(key) => write!(f, "{}", key),
            Pkh(kh) | PkH(kh) => write!(f, "{}", kh),
            Older(n) | After(n) => write!(f, "{}", n),
            Sha256(h) | Hash256(h) => write!(f, "{}", h),
            Ripemd160(h) | Hash160(h) => write!(f, "{}", h),
            AndOr(x, y, z) => write!(f, "{},{},{}", x, y, z),
            AndV(x, y) | AndB(x, y) | OrB(x, y) | OrC(x, y) | OrD(x, y) | OrI(x, y) => {
                write!(f, "{},{}", x, y)
            }
            Thresh(k, subs) => {
                write!(f, "{}", k)?;
                for sub in subs {
                    write!(f, ",{}", sub)?;
                }
                Ok(())
            }
            Multi(k, keys) | SortedMulti(k, keys) | MultiA(k, keys) | SortedMultiA(k, keys) => {
                write!(f, "{}", k)?;
                for key in keys {
                    write!(f, ",{}", key)?;
                }
                Ok(())
            }
            A(_) | S(_) | C(_) | T(_) | D(_) | V(_) | J(_) | N(_) | L(_) | U(_) => {
                unreachable!("wrappers are rendered by the Display impl")
            }
        }
    }
}

impl Display for Miniscript {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        // collect the wrapper chain into a single "abc:" prefix
        let mut node = self;
        let mut wrappers = String::new();
        loop {
            match node {
                A(x) | S(x) | C(x) | T(x) | D(x) | V(x) | J(x) | N(x) | L(x) | U(x) => {
                    wrappers.push_str(node.name());
                    node = x;
                }
                _ => break,
            }
        }
        if !wrappers.is_empty() {
            write!(f, "{}:", wrappers)?;
        }
        write!(f, "{}(", node.name())?;
        node.fmt_args(f)?;
        f.write_str(")")
    }
}

impl FromStr for Miniscript {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut cursor = Cursor::new(s.as_bytes());
        let ms = Miniscript::read_from(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(Error::Expected(cursor.position(), '\0'));
        }
        Ok(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PK_A: &str = "020e0338c96a8870479f2396c373cc7696ba124e8635d41b0ea581112b67817261";
    const PK_B: &str = "0250863ad64a87ae8a2fe83c1af1a8403cb53f53e486d8511dad8a04887e5b2352";

    #[test]
    fn parse_display_roundtrip() {
        let sources = [
            format!("or_d(c:pk_k({}),c:pk_k({}))", PK_A, PK_B),
            format!("pk({})", PK_A),
            format!("and_v(v:pk({}),or_d(pk({}),older(12960)))", PK_A, PK_B),
            format!("andor(pk({}),older(1008),pk({}))", PK_A, PK_B),
            format!(
                "thresh(2,pk({}),s:pk({}),sdv:older(12960))",
                PK_A, PK_B
            ),
            format!("multi(2,{},{})", PK_A, PK_B),
            format!("sortedmulti(2,{},{})", PK_A, PK_B),
            format!(
                "t:or_c(pk({}),and_v(v:pk({}),or_c(pk({}),v:hash160(e7d285b4817f83f724cd29394da75dfc84fe639e))))",
                PK_A, PK_B, PK_A
            ),
            format!("j:and_b(pk({}),s:pk({}))", PK_A, PK_B),
        ];
        for source in &sources {
            let ms: Miniscript = source.parse().unwrap();
            assert_eq!(&ms.to_string(), source, "failed on {}", source);
            ms.verify().unwrap();
        }
    }

    #[test]
    fn compile_matches_reference() {
        // known-good compilation vectors
        let ms: Miniscript = format!("or_d(c:pk_k({}),c:pk_k({}))", PK_A, PK_B)
            .parse()
            .unwrap();
        assert_eq!(
            hex::encode(ms.compile()),
            format!("21{}ac736421{}ac68", PK_A, PK_B)
        );

        let ms: Miniscript = format!("multi(2,{},{})", PK_A, PK_B).parse().unwrap();
        assert_eq!(
            hex::encode(ms.compile()),
            format!("5221{}21{}52ae", PK_A, PK_B)
        );
    }

    #[test]
    fn compiled_length_matches_declared() {
        let sources = [
            format!("pk({})", PK_A),
            format!("or_b(pk({}),s:pk({}))", PK_A, PK_B),
            format!("and_v(v:pk({}),or_d(pk({}),older(12960)))", PK_A, PK_B),
            format!(
                "thresh(2,pk({}),s:pk({}),sdv:older(12960))",
                PK_A, PK_B
            ),
            format!("sortedmulti(2,{},{})", PK_A, PK_B),
            format!("j:and_b(pk({}),s:pk({}))", PK_A, PK_B),
            format!("l:or_b(pk({}),a:pk({}))", PK_A, PK_B),
            format!("u:pk({})", PK_A),
            format!("t:v:pk({})", PK_A),
            format!("n:pk({})", PK_A),
        ];
        for source in &sources {
            let ms: Miniscript = source.parse().unwrap();
            assert_eq!(
                ms.compile().len(),
                ms.script_len(),
                "length mismatch for {}",
                source
            );
        }
    }

    #[test]
    fn verify_mergeable_opcode() {
        // v:pk ends with CHECKSIGVERIFY, not CHECKSIG VERIFY
        let ms: Miniscript = format!("and_v(v:pk({}),older(1000))", PK_A).parse().unwrap();
        let script = ms.compile();
        let pos = 34; // key push (34 bytes including length prefix)
        assert_eq!(script[pos], crate::script::op::OP_CHECKSIGVERIFY);
        // v:older has no VERIFY form - an explicit OP_VERIFY is appended
        let ms: Miniscript = "v:older(1000)".parse().unwrap();
        assert_eq!(
            *ms.compile().last().unwrap(),
            crate::script::op::OP_VERIFY
        );
    }

    #[test]
    fn type_soundness() {
        // pk is Bondu
        let ms: Miniscript = format!("pk({})", PK_A).parse().unwrap();
        let ty = ms.ms_type().unwrap();
        assert_eq!(ty.base, Base::B);
        assert!(ty.o && ty.n && ty.d && ty.u && !ty.z);

        // older is Bz
        let ms: Miniscript = "older(100)".parse().unwrap();
        let ty = ms.ms_type().unwrap();
        assert!(ty.z && !ty.d);

        // and_v(v:pk, pk) is valid B
        let ms: Miniscript = format!("and_v(v:pk({}),pk({}))", PK_A, PK_B).parse().unwrap();
        ms.verify().unwrap();

        // pk_k alone is K, not a valid top level
        let ms: Miniscript = format!("pk_k({})", PK_A).parse().unwrap();
        assert_eq!(ms.verify(), Err(Error::NonTopLevelB(Base::K)));

        // and_v(pk, pk) is ill-typed: X must be V
        let ms: Miniscript = format!("and_v(pk({}),pk({}))", PK_A, PK_B).parse().unwrap();
        assert!(ms.verify().is_err());

        // or_b requires a W second argument
        let ms: Miniscript = format!("or_b(pk({}),pk({}))", PK_A, PK_B).parse().unwrap();
        assert!(ms.verify().is_err());

        // s: wrapper requires Bo, and older is z
        let ms: Miniscript = "s:older(100)".parse().unwrap();
        assert!(ms.verify().is_err());

        // timelock zero is rejected
        let ms: Miniscript = "older(0)".parse().unwrap();
        assert!(ms.verify().is_err());

        // threshold out of range
        let ms: Miniscript = format!("multi(3,{},{})", PK_A, PK_B).parse().unwrap();
        assert_eq!(ms.verify(), Err(Error::BadThreshold(3, 2)));
    }

    #[test]
    fn sortedmulti_is_permutation_invariant() {
        let forward: Miniscript = format!("sortedmulti(2,{},{})", PK_A, PK_B).parse().unwrap();
        let backward: Miniscript = format!("sortedmulti(2,{},{})", PK_B, PK_A).parse().unwrap();
        assert_eq!(forward.compile(), backward.compile());

        // and equals multi with pre-sorted keys
        let mut keys = [PK_A, PK_B];
        keys.sort();
        let multi: Miniscript = format!("multi(2,{},{})", keys[0], keys[1]).parse().unwrap();
        assert_eq!(forward.compile(), multi.compile());
    }

    #[test]
    fn keys_collection() {
        let ms: Miniscript = format!(
            "andor(pk({}),older(1008),multi(1,{}))",
            PK_A, PK_B
        )
        .parse()
        .unwrap();
        let keys = ms.keys();
        assert_eq!(keys.len(), 2);
        assert_eq!(hex::encode(keys[0].sec()), PK_A);
        assert_eq!(hex::encode(keys[1].sec()), PK_B);
    }
}
