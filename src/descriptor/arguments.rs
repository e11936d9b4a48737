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

//! Descriptor argument types: keys with their origin and derivation
//! template, key hashes, numbers and raw hash arguments.
//!
//! A key is `[origin]inner[/derivation]` where the derivation template may
//! contain a single `*` wildcard and a single branch set (`<a;b>` standard
//! form or `{a,b}` legacy form); hardened steps are allowed only when the
//! inner key carries private material.

use core::fmt::{self, Display, Formatter};
use core::str::FromStr;

use super::lex::Cursor;
use crate::bip32::{self, DerivationPath, HDKey, HARDENED_INDEX_BOUNDARY};
use crate::ec::{self, PrivateKey, PublicKey};
use crate::hashes::hash160;
use crate::networks::Network;

/// Errors of descriptor argument parsing and derivation
#[derive(Clone, PartialEq, Eq, Debug, Display, From, Error)]
#[display(doc_comments)]
pub enum Error {
    /// key origin must start with an 8-character hex fingerprint
    InvalidOrigin,

    /// unterminated key origin (missing ')')
    UnterminatedOrigin,

    /// derivation template allows only one wildcard
    MultipleWildcards,

    /// derivation template allows only one branch set
    MultipleBranches,

    /// hardened derivation is not allowed for this key
    HardenedNotAllowed,

    /// derivation index is out of the [0, 2^31) range
    IndexOutOfRange,

    /// invalid derivation template element '{0}'
    InvalidElement(String),

    /// branch index {0} is out of the branch set
    InvalidBranchIndex(u32),

    /// key '{0}' does not support child derivation
    KeyNotDerivable(String),

    /// invalid key data
    InvalidKey,

    /// invalid raw hash argument length, {0} hex characters expected
    InvalidRawLength(usize),

    /// number argument is not a valid decimal
    InvalidNumber,

    /// EC error: {0}
    #[from]
    Ec(ec::Error),

    /// BIP-32 error: {0}
    #[from]
    Bip32(bip32::Error),
}

/// Key origin: master fingerprint plus the fixed derivation leading to the
/// key, e.g. `[f45912ab/44h/0h]`
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct KeyOrigin {
    pub fingerprint: [u8; 4],
    pub derivation: DerivationPath,
}

impl Display for KeyOrigin {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.derivation.to_string_with_fingerprint(self.fingerprint))
    }
}

impl FromStr for KeyOrigin {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (fp, rest) = match s.find('/') {
            Some(pos) => (&s[..pos], &s[pos..]),
            None => (s, ""),
        };
        if fp.len() != 8 {
            return Err(Error::InvalidOrigin);
        }
        let mut fingerprint = [0u8; 4];
        hex::decode_to_slice(fp, &mut fingerprint).map_err(|_| Error::InvalidOrigin)?;
        let derivation: DerivationPath = format!("m{}", rest)
            .parse()
            .map_err(|_| Error::InvalidOrigin)?;
        Ok(KeyOrigin {
            fingerprint,
            derivation,
        })
    }
}

/// Style the branch set was written in; kept to round-trip the text form
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BranchStyle {
    /// `<a;b>` - the standard multipath form
    Angle,
    /// `{a,b}` - the legacy form
    Curly,
}

/// Single element of a derivation template
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum DerivationStep {
    /// Fixed child index (may be hardened)
    Index(u32),
    /// `*` - filled by the address index on derivation
    Wildcard,
    /// Branch set - filled by the branch index on derivation
    Branch(Vec<u32>),
}

/// Derivation template following a key: `/{0,1}/*`, `/<0;1>/*`, `/0/5` etc
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Derivation {
    pub steps: Vec<DerivationStep>,
    pub branch_style: BranchStyle,
}

impl Derivation {
    /// Validates wildcard/branch cardinality
    pub fn with(steps: Vec<DerivationStep>, branch_style: BranchStyle) -> Result<Derivation, Error> {
        if steps
            .iter()
            .filter(|s| matches!(s, DerivationStep::Wildcard))
            .count()
            > 1
        {
            return Err(Error::MultipleWildcards);
        }
        if steps
            .iter()
            .filter(|s| matches!(s, DerivationStep::Branch(_)))
            .count()
            > 1
        {
            return Err(Error::MultipleBranches);
        }
        Ok(Derivation {
            steps,
            branch_style,
        })
    }

    /// Parses a template; hardened elements require `allow_hardened`
    pub fn parse(der: &str, allow_hardened: bool) -> Result<Option<Derivation>, Error> {
        if der.is_empty() {
            return Ok(None);
        }
        let mut style = BranchStyle::Curly;
        let mut steps = vec![];
        for element in der.split('/') {
            steps.push(Self::parse_element(element, allow_hardened, &mut style, true)?);
        }
        Self::with(steps, style).map(Some)
    }

    fn parse_element(
        element: &str,
        allow_hardened: bool,
        style: &mut BranchStyle,
        allow_set: bool,
    ) -> Result<DerivationStep, Error> {
        if element == "*" {
            return Ok(DerivationStep::Wildcard);
        }
        let set = if element.starts_with('{') && element.ends_with('}') {
            *style = BranchStyle::Curly;
            Some((&element[1..element.len() - 1], ','))
        } else if element.starts_with('<') && element.ends_with('>') {
            *style = BranchStyle::Angle;
            Some((&element[1..element.len() - 1], ';'))
        } else {
            None
        };
        if let Some((inner, separator)) = set {
            if !allow_set {
                return Err(Error::InvalidElement(element.to_string()));
            }
            let mut branch = vec![];
            for item in inner.split(separator) {
                match Self::parse_element(item, allow_hardened, style, false)? {
                    DerivationStep::Index(idx) => branch.push(idx),
                    _ => return Err(Error::InvalidElement(element.to_string())),
                }
            }
            return Ok(DerivationStep::Branch(branch));
        }
        let (digits, hardened) = match element.strip_suffix(|c| c == 'h' || c == '\'') {
            Some(digits) => (digits, true),
            None => (element, false),
        };
        if hardened && !allow_hardened {
            return Err(Error::HardenedNotAllowed);
        }
        let index: u32 = digits
            .parse()
            .map_err(|_| Error::InvalidElement(element.to_string()))?;
        if index >= HARDENED_INDEX_BOUNDARY {
            return Err(Error::IndexOutOfRange);
        }
        Ok(DerivationStep::Index(if hardened {
            index + HARDENED_INDEX_BOUNDARY
        } else {
            index
        }))
    }

    /// Branch set of the template, if present
    pub fn branches(&self) -> Option<&[u32]> {
        self.steps.iter().find_map(|s| match s {
            DerivationStep::Branch(b) => Some(&b[..]),
            _ => None,
        })
    }

    pub fn is_wildcard(&self) -> bool {
        self.steps.iter().any(|s| matches!(s, DerivationStep::Wildcard))
    }

    pub fn has_hardened(&self) -> bool {
        self.steps.iter().any(|s| match s {
            DerivationStep::Index(idx) => *idx >= HARDENED_INDEX_BOUNDARY,
            DerivationStep::Branch(b) => b.iter().any(|idx| *idx >= HARDENED_INDEX_BOUNDARY),
            DerivationStep::Wildcard => false,
        })
    }

    /// Substitutes the wildcard with `index` and the branch set with its
    /// `branch_index`-th element (first when `None`), producing concrete
    /// child indices
    pub fn fill(&self, index: u32, branch_index: Option<u32>) -> Result<Vec<u32>, Error> {
        if index >= HARDENED_INDEX_BOUNDARY {
            return Err(Error::IndexOutOfRange);
        }
        let mut path = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            match step {
                DerivationStep::Index(idx) => path.push(*idx),
                DerivationStep::Wildcard => path.push(index),
                DerivationStep::Branch(branch) => {
                    let branch_index = branch_index.unwrap_or(0);
                    let value = branch
                        .get(branch_index as usize)
                        .ok_or(Error::InvalidBranchIndex(branch_index))?;
                    path.push(*value);
                }
            }
        }
        Ok(path)
    }
}

impl Display for Derivation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let render = |f: &mut Formatter<'_>, idx: u32| -> fmt::Result {
            if idx >= HARDENED_INDEX_BOUNDARY {
                write!(f, "{}h", idx - HARDENED_INDEX_BOUNDARY)
            } else {
                write!(f, "{}", idx)
            }
        };
        for step in &self.steps {
            f.write_str("/")?;
            match step {
                DerivationStep::Index(idx) => render(f, *idx)?,
                DerivationStep::Wildcard => f.write_str("*")?,
                DerivationStep::Branch(branch) => {
                    let (open, separator, close) = match self.branch_style {
                        BranchStyle::Curly => ('{', ',', '}'),
                        BranchStyle::Angle => ('<', ';', '>'),
                    };
                    write!(f, "{}", open)?;
                    for (i, idx) in branch.iter().enumerate() {
                        if i > 0 {
                            write!(f, "{}", separator)?;
                        }
                        render(f, *idx)?;
                    }
                    write!(f, "{}", close)?;
                }
            }
        }
        Ok(())
    }
}

/// Key material kinds a descriptor key slot can hold
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum KeyInner {
    /// Extended private or public key
    HD(HDKey),
    /// Plain public key (compressed or uncompressed hex)
    Pub(PublicKey),
    /// WIF private key
    Priv(PrivateKey),
    /// x-only public key (taproot contexts)
    XOnly(PublicKey),
}

/// Descriptor key argument
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Key {
    pub origin: Option<KeyOrigin>,
    pub inner: KeyInner,
    pub derivation: Option<Derivation>,
}

impl Key {
    /// Reads a key from descriptor text up to (but not including) a `,`,
    /// `)` or end of input
    pub fn read_from(cursor: &mut Cursor) -> Result<Key, Error> {
        let origin = if cursor.eat(b'[') {
            let (prefix, delim) = cursor.read_until(b"]");
            if delim != Some(b']') {
                return Err(Error::UnterminatedOrigin);
            }
            let text = core::str::from_utf8(prefix).map_err(|_| Error::InvalidOrigin)?;
            Some(text.parse::<KeyOrigin>()?)
        } else {
            None
        };

        let (key_bytes, delim) = cursor.read_until(b",)/");
        let mut der = Vec::new();
        if delim == Some(b'/') {
            // consume the whole template, including a single branch set
            let (head, stop) = cursor.read_until(b"{<,)");
            der.extend_from_slice(head);
            match stop {
                Some(open @ b'{') | Some(open @ b'<') => {
                    der.push(open);
                    let close: &[u8] = if open == b'{' { b"}" } else { b">" };
                    let (branch, stop) = cursor.read_until(close);
                    if stop.is_none() {
                        return Err(Error::InvalidElement(
                            String::from_utf8_lossy(&der).into_owned(),
                        ));
                    }
                    der.extend_from_slice(branch);
                    der.push(close[0]);
                    let (rest, stop) = cursor.read_until(b",)");
                    der.extend_from_slice(rest);
                    if stop.is_some() {
                        cursor.unread();
                    }
                }
                Some(_) => cursor.unread(),
                None => {}
            }
        } else if delim.is_some() {
            cursor.unread();
        }

        let inner = Self::parse_inner(key_bytes)?;
        let allow_hardened = matches!(
            &inner,
            KeyInner::HD(hd) if hd.is_private()
        );
        let der_text = core::str::from_utf8(&der).map_err(|_| Error::InvalidKey)?;
        let derivation = Derivation::parse(der_text, allow_hardened)?;
        if derivation.is_some() && !matches!(inner, KeyInner::HD(_)) {
            return Err(Error::KeyNotDerivable(
                String::from_utf8_lossy(key_bytes).into_owned(),
            ));
        }
        Ok(Key {
            origin,
            inner,
            derivation,
        })
    }

    fn parse_inner(data: &[u8]) -> Result<KeyInner, Error> {
        let text = core::str::from_utf8(data).map_err(|_| Error::InvalidKey)?;
        if (text.len() == 66 || text.len() == 130)
            && (text.starts_with("02") || text.starts_with("03") || text.starts_with("04"))
        {
            let bytes = hex::decode(text).map_err(|_| Error::InvalidKey)?;
            return Ok(KeyInner::Pub(PublicKey::parse(&bytes)?));
        }
        if text.len() == 64 {
            // x-only key
            let bytes = hex::decode(text).map_err(|_| Error::InvalidKey)?;
            let mut xonly = [0u8; 32];
            xonly.copy_from_slice(&bytes);
            return Ok(KeyInner::XOnly(PublicKey::from_xonly(&xonly)?));
        }
        if text.len() > 4 && matches!(text.get(1..4), Some("pub") | Some("prv")) {
            return Ok(KeyInner::HD(
                text.parse::<HDKey>().map_err(|_| Error::InvalidKey)?,
            ));
        }
        Ok(KeyInner::Priv(
            PrivateKey::from_wif(text).map_err(|_| Error::InvalidKey)?,
        ))
    }

    pub fn from_string(s: &str) -> Result<Key, Error> {
        let mut cursor = Cursor::new(s.as_bytes());
        let key = Key::read_from(&mut cursor)?;
        if !cursor.is_empty() {
            return Err(Error::InvalidKey);
        }
        Ok(key)
    }

    pub fn is_private(&self) -> bool {
        match &self.inner {
            KeyInner::HD(hd) => hd.is_private(),
            KeyInner::Priv(_) => true,
            _ => false,
        }
    }

    /// Whether derivation changes this key
    pub fn can_derive(&self) -> bool {
        self.derivation.is_some() && matches!(self.inner, KeyInner::HD(_))
    }

    pub fn is_wildcard(&self) -> bool {
        self.derivation
            .as_ref()
            .map(Derivation::is_wildcard)
            .unwrap_or(false)
    }

    pub fn branches(&self) -> Option<&[u32]> {
        self.derivation.as_ref().and_then(Derivation::branches)
    }

    /// SEC serialization of the key: 33/65 bytes, or 32 bytes for x-only
    pub fn sec(&self) -> Vec<u8> {
        match &self.inner {
            KeyInner::HD(hd) => hd.sec(),
            KeyInner::Pub(pubkey) => pubkey.sec(),
            KeyInner::Priv(seckey) => seckey.sec(),
            KeyInner::XOnly(pubkey) => pubkey.xonly().to_vec(),
        }
    }

    /// Public key of the slot (lifted to even-y for x-only keys)
    pub fn public_key(&self) -> PublicKey {
        match &self.inner {
            KeyInner::HD(hd) => hd.public_key(),
            KeyInner::Pub(pubkey) | KeyInner::XOnly(pubkey) => *pubkey,
            KeyInner::Priv(seckey) => seckey.public_key(),
        }
    }

    /// Private key material if the slot carries any
    pub fn private_key(&self) -> Option<PrivateKey> {
        match &self.inner {
            KeyInner::HD(hd) => hd.private_key().cloned(),
            KeyInner::Priv(seckey) => Some(seckey.clone()),
            _ => None,
        }
    }

    /// Script push of the serialized key
    pub fn compile(&self) -> Vec<u8> {
        let data = self.sec();
        let mut result = vec![data.len() as u8];
        result.extend_from_slice(&data);
        result
    }

    /// Substitutes the derivation template producing a concrete key; the
    /// origin is extended with the filled path
    pub fn derive(&self, index: u32, branch_index: Option<u32>) -> Result<Key, Error> {
        let derivation = match &self.derivation {
            None => return Ok(self.clone()),
            Some(derivation) => derivation,
        };
        let path = derivation.fill(index, branch_index)?;
        let hd = match &self.inner {
            KeyInner::HD(hd) => hd,
            _ => return Err(Error::KeyNotDerivable(self.to_string())),
        };
        let derived = hd.derive(&path[..])?;
        let origin = match &self.origin {
            Some(origin) => {
                let mut full = origin.derivation.0.clone();
                full.extend_from_slice(&path);
                Some(KeyOrigin {
                    fingerprint: origin.fingerprint,
                    derivation: DerivationPath(full),
                })
            }
            None => Some(KeyOrigin {
                fingerprint: hd.my_fingerprint(),
                derivation: DerivationPath(path),
            }),
        };
        Ok(Key {
            origin,
            inner: KeyInner::HD(derived),
            derivation: None,
        })
    }

    /// Full derivation path from the origin fingerprint for PSBT fields
    pub fn full_derivation(&self) -> Option<(&[u8; 4], &DerivationPath)> {
        self.origin
            .as_ref()
            .map(|origin| (&origin.fingerprint, &origin.derivation))
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(origin) = &self.origin {
            write!(f, "[{}]", origin)?;
        }
        match &self.inner {
            KeyInner::HD(hd) => write!(f, "{}", hd)?,
            KeyInner::Pub(pubkey) => write!(f, "{}", pubkey)?,
            KeyInner::XOnly(pubkey) => f.write_str(&hex::encode(pubkey.xonly()))?,
            KeyInner::Priv(seckey) => {
                f.write_str(&seckey.wif(&crate::networks::MAINNET))?
            }
        }
        if let Some(derivation) = &self.derivation {
            write!(f, "{}", derivation)?;
        }
        Ok(())
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::from_string(s)
    }
}

/// WIF rendering respecting a network; descriptor display uses mainnet
impl Key {
    pub fn to_string_with_network(&self, network: &Network) -> String {
        match &self.inner {
            KeyInner::Priv(seckey) => {
                let prefix = self
                    .origin
                    .as_ref()
                    .map(|origin| format!("[{}]", origin))
                    .unwrap_or_default();
                format!("{}{}", prefix, seckey.wif(network))
            }
            _ => self.to_string(),
        }
    }
}

/// Key-hash argument: a key whose HASH160 is pushed, or a raw 20-byte hash
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum KeyHash {
    Key(Key),
    Raw([u8; 20]),
}

impl KeyHash {
    pub fn read_from(cursor: &mut Cursor) -> Result<KeyHash, Error> {
        // a raw hash is exactly 40 hex characters with no origin/derivation
        let probe = *cursor;
        let (body, delim) = {
            let mut lookahead = probe;
            lookahead.read_until(b",)")
        };
        let _ = delim;
        if body.len() == 40 && body.iter().all(u8::is_ascii_hexdigit) {
            let (body, delim) = cursor.read_until(b",)");
            if delim.is_some() {
                cursor.unread();
            }
            let mut raw = [0u8; 20];
            hex::decode_to_slice(core::str::from_utf8(body).expect("hex digits"), &mut raw)
                .map_err(|_| Error::InvalidKey)?;
            return Ok(KeyHash::Raw(raw));
        }
        Ok(KeyHash::Key(Key::read_from(cursor)?))
    }

    /// The 20-byte hash this argument compiles to
    pub fn serialize(&self) -> [u8; 20] {
        match self {
            KeyHash::Key(key) => hash160(key.sec()),
            KeyHash::Raw(raw) => *raw,
        }
    }

    pub fn compile(&self) -> Vec<u8> {
        let mut result = vec![20u8];
        result.extend_from_slice(&self.serialize());
        result
    }

    pub fn derive(&self, index: u32, branch_index: Option<u32>) -> Result<KeyHash, Error> {
        match self {
            KeyHash::Key(key) => Ok(KeyHash::Key(key.derive(index, branch_index)?)),
            KeyHash::Raw(raw) => Ok(KeyHash::Raw(*raw)),
        }
    }

    pub fn key(&self) -> Option<&Key> {
        match self {
            KeyHash::Key(key) => Some(key),
            KeyHash::Raw(_) => None,
        }
    }
}

impl Display for KeyHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            KeyHash::Key(key) => write!(f, "{}", key),
            KeyHash::Raw(raw) => f.write_str(&hex::encode(raw)),
        }
    }
}

/// Numeric argument of `older`/`after`/`multi`/`thresh`
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, Display)]
#[display(inner)]
pub struct Number(pub u32);

impl Number {
    pub fn read_from(cursor: &mut Cursor) -> Result<Number, Error> {
        let mut value: u64 = 0;
        let mut any = false;
        while let Some(byte) = cursor.peek() {
            if !byte.is_ascii_digit() {
                break;
            }
            cursor.next_byte();
            any = true;
            value = value * 10 + (byte - b'0') as u64;
            if value > u32::MAX as u64 {
                return Err(Error::InvalidNumber);
            }
        }
        if !any {
            return Err(Error::InvalidNumber);
        }
        Ok(Number(value as u32))
    }

    /// Minimal script-number push
    pub fn compile(&self) -> Vec<u8> {
        let n = self.0;
        if n == 0 {
            return vec![0x00];
        }
        if n <= 16 {
            return vec![0x50 + n as u8];
        }
        let mut bytes: Vec<u8> = n.to_le_bytes().to_vec();
        while bytes.last() == Some(&0) {
            bytes.pop();
        }
        // avoid the sign bit of script numbers
        if bytes.last().map(|b| b & 0x80 != 0).unwrap_or(false) {
            bytes.push(0x00);
        }
        let mut result = vec![bytes.len() as u8];
        result.extend_from_slice(&bytes);
        result
    }

    pub fn compiled_len(&self) -> usize {
        self.compile().len()
    }
}

/// Raw 32-byte hash argument (`sha256`, `hash256`)
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Raw32(pub [u8; 32]);

/// Raw 20-byte hash argument (`ripemd160`, `hash160`)
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct Raw20(pub [u8; 20]);

macro_rules! impl_raw {
    ($ty:ident, $len:literal) => {
        impl $ty {
            pub fn read_from(cursor: &mut Cursor) -> Result<$ty, Error> {
                let (body, delim) = cursor.read_until(b",)");
                if delim.is_some() {
                    cursor.unread();
                }
                if body.len() != $len * 2 {
                    return Err(Error::InvalidRawLength(body.len()));
                }
                let mut raw = [0u8; $len];
                hex::decode_to_slice(
                    core::str::from_utf8(body).map_err(|_| Error::InvalidKey)?,
                    &mut raw,
                )
                .map_err(|_| Error::InvalidRawLength(body.len()))?;
                Ok($ty(raw))
            }

            pub fn compile(&self) -> Vec<u8> {
                let mut result = vec![$len as u8];
                result.extend_from_slice(&self.0);
                result
            }
        }

        impl Display for $ty {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }
    };
}

impl_raw!(Raw32, 32);
impl_raw!(Raw20, 20);

#[cfg(test)]
mod tests {
    use super::*;

    const XPUB: &str = "xpub6F6wWxm8F64iBHNhyaoh3QKCuuMUY5pfPPr1H1WuZXUXeXtZ21qjFN5ykaqnLL1jtPEFB9d94CyZrcYWKVdSiJKQ6mLGEB5sfrGFBpg6wgA";

    #[test]
    fn key_forms_roundtrip() {
        let forms = [
            format!("[abcdef12/84h/22h]{}/{{0,1}}/*", XPUB),
            "03e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130".to_string(),
            format!("[12345678/44h/12]{}/0/*", XPUB),
            format!("{}/<0;1>/*", XPUB),
            "KwF4aJaqLFBUyGpJqWWGBPJkDSXnEVwheaFNz5UEWqFPd43exAMB".to_string(),
            format!("[f45912ab/44h/12/32h]{}", XPUB),
        ];
        for form in &forms {
            let key = Key::from_string(form).unwrap();
            assert_eq!(&key.to_string(), form, "failed on {}", form);
        }
    }

    #[test]
    fn wildcard_and_branch_rules() {
        assert!(Key::from_string(&format!("{}/*/*", XPUB)).is_err());
        assert!(Key::from_string(&format!("{}/{{0,1}}/{{2,3}}", XPUB)).is_err());
        // hardened template over an xpub is rejected
        assert!(Key::from_string(&format!("{}/1h/*", XPUB)).is_err());
        // derivation on a plain pubkey is rejected
        assert!(Key::from_string(
            "03e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130/0/*"
        )
        .is_err());
    }

    #[test]
    fn derive_fills_template() {
        let key = Key::from_string(&format!("[abcdef12/84h/0h]{}/{{0,1}}/*", XPUB)).unwrap();
        assert!(key.can_derive());
        assert!(key.is_wildcard());
        assert_eq!(key.branches(), Some(&[0u32, 1][..]));

        let recv = key.derive(7, None).unwrap();
        assert!(!recv.can_derive());
        let origin = recv.origin.as_ref().unwrap();
        assert_eq!(origin.derivation.to_string(), "m/84h/0h/0/7");

        let change = key.derive(7, Some(1)).unwrap();
        assert_eq!(
            change.origin.as_ref().unwrap().derivation.to_string(),
            "m/84h/0h/1/7"
        );
        assert_ne!(recv.sec(), change.sec());

        assert!(key.derive(7, Some(2)).is_err());
        assert!(key.derive(HARDENED_INDEX_BOUNDARY, None).is_err());
    }

    #[test]
    fn xonly_keys() {
        let xonly = "e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130";
        let key = Key::from_string(xonly).unwrap();
        assert_eq!(key.sec().len(), 32);
        assert_eq!(key.to_string(), xonly);
        assert_eq!(key.compile().len(), 33);
    }

    #[test]
    fn keyhash_raw_and_key() {
        let raw = "8e5d7457d33a978d1c3c1e440f92a195e00cc7d8";
        let mut cursor = Cursor::new(raw.as_bytes());
        let kh = KeyHash::read_from(&mut cursor).unwrap();
        assert_eq!(hex::encode(kh.serialize()), raw);
        assert_eq!(kh.to_string(), raw);

        let mut cursor = Cursor::new(
            b"03e7d285b4817f83f724cd29394da75dfc84fe639ed147a944e7e6064703b14130)",
        );
        let kh = KeyHash::read_from(&mut cursor).unwrap();
        assert!(kh.key().is_some());
        assert_eq!(kh.compile().len(), 21);
    }

    #[test]
    fn number_compilation() {
        assert_eq!(Number(0).compile(), vec![0x00]);
        assert_eq!(Number(1).compile(), vec![0x51]);
        assert_eq!(Number(16).compile(), vec![0x60]);
        assert_eq!(Number(17).compile(), vec![0x01, 0x11]);
        assert_eq!(Number(1000).compile(), vec![0x02, 0xE8, 0x03]);
        // 128 needs a zero pad to keep the sign bit clear
        assert_eq!(Number(128).compile(), vec![0x02, 0x80, 0x00]);
        assert_eq!(Number(12960).compile(), vec![0x02, 0xA0, 0x32]);
    }
}
