/*
    Copyright (C) 2020-2022  Rafal Michalski

    This file is part of SPECTAPE, a Rust library of ZX Spectrum tape formats.

    For the full copyright notice, see the lib.rs file.
*/
/*! DSA signatures attesting the authenticity of input recordings.

A signature is serialized as two multi-precision integers: `r` followed by `s`.
Each integer is encoded the way OpenPGP encodes them: a 2 byte (MSB first) number of
significant bits followed by the minimal number of big-endian bytes holding those bits.

The message digest is SHA-1 and the signing nonce is derived deterministically (RFC 6979).
*/
use core::fmt;

use dsa::{BigUint, Components, SigningKey, VerifyingKey};
use sha1::{Digest, Sha1};
use signature::{DigestSigner, DigestVerifier};

use crate::error::{Error, Result};

/// A DSA public key.
#[derive(Clone, PartialEq)]
pub struct PublicKey(VerifyingKey);

/// A DSA private key.
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

fn bad_key() -> Error {
    Error::corrupt("invalid DSA key parameters")
}

fn components(p: &[u8], q: &[u8], g: &[u8]) -> Result<Components> {
    Components::from_components(BigUint::from_bytes_be(p),
                                BigUint::from_bytes_be(q),
                                BigUint::from_bytes_be(g)).map_err(|_| bad_key())
}

impl PublicKey {
    /// Creates a public key from its big-endian encoded parameters.
    pub fn from_be_bytes(p: &[u8], q: &[u8], g: &[u8], y: &[u8]) -> Result<Self> {
        let components = components(p, q, g)?;
        VerifyingKey::from_components(components, BigUint::from_bytes_be(y))
                     .map(PublicKey).map_err(|_| bad_key())
    }
}

impl PrivateKey {
    /// Creates a private key from its big-endian encoded parameters.
    pub fn from_be_bytes(p: &[u8], q: &[u8], g: &[u8], y: &[u8], x: &[u8]) -> Result<Self> {
        let PublicKey(verifying) = PublicKey::from_be_bytes(p, q, g, y)?;
        SigningKey::from_components(verifying, BigUint::from_bytes_be(x))
                   .map(PrivateKey).map_err(|_| bad_key())
    }
    /// Returns the public part of this key.
    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.0.verifying_key().clone())
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey {{ {} bits }}", self.0.components().p().bits())
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey { .. }")
    }
}

fn write_mpi(out: &mut Vec<u8>, n: &BigUint) -> Result<()> {
    let bits = n.bits();
    if bits > u16::MAX as usize {
        return Err(Error::logic("integer too large for MPI encoding"))
    }
    out.extend_from_slice(&(bits as u16).to_be_bytes());
    out.extend_from_slice(&n.to_bytes_be());
    Ok(())
}

/// Reads a single MPI, returning it with the remaining input.
fn read_mpi(data: &[u8]) -> Option<(BigUint, &[u8])> {
    let (head, rest) = (data.get(..2)?, data.get(2..)?);
    let bits = u16::from_be_bytes([head[0], head[1]]) as usize;
    let len = (bits + 7) / 8;
    let bytes = rest.get(..len)?;
    let n = BigUint::from_bytes_be(bytes);
    if n.bits() != bits {
        return None
    }
    Some((n, &rest[len..]))
}

/// Signs `data` with the given private key and returns the serialized signature.
pub fn sign(data: &[u8], key: &PrivateKey) -> Result<Vec<u8>> {
    let sig: dsa::Signature = key.0.try_sign_digest(Sha1::new_with_prefix(data))
                                   .map_err(|e| Error::logic(format_args!("DSA signing failed: {}", e)))?;
    let mut out = Vec::with_capacity(44);
    write_mpi(&mut out, sig.r())?;
    write_mpi(&mut out, sig.s())?;
    Ok(out)
}

/// Verifies the serialized `signature` of `data` with the given public key.
///
/// # Errors
/// Returns [Error::Signature] if the signature does not match the data or the key
/// and [Error::Corrupt] if the signature is not a valid pair of integers.
pub fn verify(signature: &[u8], data: &[u8], key: &PublicKey) -> Result<()> {
    let (r, rest) = read_mpi(signature).ok_or_else(|| bad_signature("r"))?;
    let (s, rest) = read_mpi(rest).ok_or_else(|| bad_signature("s"))?;
    if !rest.is_empty() {
        return Err(Error::corrupt(format_args!(
            "DSA signature: {} bytes of junk after the integers", rest.len())))
    }
    let sig = dsa::Signature::from_components(r, s).map_err(|_| Error::Signature)?;
    key.0.verify_digest(Sha1::new_with_prefix(data), &sig)
         .map_err(|_| Error::Signature)
}

fn bad_signature(what: &str) -> Error {
    Error::corrupt(format_args!("DSA signature: malformed integer {}", what))
}

/// A fixed 1024-bit DSA key pair for tests. Never use it to sign real recordings.
#[cfg(any(test, feature = "test-keys"))]
pub mod test_keys {
    use super::*;

    const P: &str = "baad6e37e54cd42588c6af3760fd362ce3687472b9e7e76bc9278099ce467c3e\
                     6ee9731e31d54867f0cc830e04c3d4000d1a2b654ab5d780c127f24aafa3adbf\
                     03eab56f3d2a4d44796fb61e04a4653240bece77f0b6127b8e5d181d817158dc\
                     3eb8f2df6b1ca664aad53dde8302976b3ad3877b51ed6af28dec7ed3d26f5975";
    const Q: &str = "a51adc81d5ffbea05ee58697555008429eeecd39";
    const G: &str = "6ab554f4673bb2aed09389c95933d3a850d3f5775391eb726ec2983cf311b89a\
                     8cf8d734bed86a5d17e4c9891da2d6dd7d5b2bb30ba5998d1ce2fb1dbd225102\
                     0bcfd3d3243302f974c8046858b66eb9fb3d1ca4243343c6854996edc00857eb\
                     ea1384adef6ef31cf2380792977ac411b39741f6dd3c1d151460a8fb0256870c";
    const Y: &str = "33fabde279674784e75572c979ab61e85cd02e3678ff8123372ce85105d22521\
                     18124e65b85f572b92befa52fa10437726a829611774e878f39702bec54ff34c\
                     dfc212b665f95c8ca89ea99748b3666442f9d3f5e36a410ea97be39fcd9e88be\
                     fd33320a7fe93152e59cb4ceb1dac12e738a16b549beda26e8a6e1b5f549bfa2";
    const X: &str = "366c9342485ccd16c7d89b35e130c4693909f029";

    fn from_hex(s: &str) -> Result<Vec<u8>> {
        (0..s.len()).step_by(2)
                    .map(|i| s.get(i..i + 2).and_then(|b| u8::from_str_radix(b, 16).ok())
                              .ok_or_else(|| Error::corrupt("invalid hex digits")))
                    .collect()
    }

    pub fn test_private_key() -> Result<PrivateKey> {
        PrivateKey::from_be_bytes(&from_hex(P)?, &from_hex(Q)?, &from_hex(G)?, &from_hex(Y)?, &from_hex(X)?)
    }
}

#[cfg(test)]
mod tests {
    use super::test_keys::test_private_key;
    use super::*;

    #[test]
    fn sign_verify_works() -> Result<()> {
        let key = test_private_key()?;
        let public = key.public_key();
        let data = b"RZX!\x00\x0d\x01\x00\x00\x00 some recording";
        let signature = sign(data, &key)?;
        assert_eq!(signature, sign(data, &key)?);
        verify(&signature, data, &public)?;
        for i in 0..data.len() {
            let mut tampered = data.to_vec();
            tampered[i] ^= 0x01;
            assert!(verify(&signature, &tampered, &public).unwrap_err().is_signature());
        }
        for i in 0..signature.len() {
            let mut tampered = signature.clone();
            tampered[i] ^= 0x10;
            let err = verify(&tampered, data, &public).unwrap_err();
            assert!(err.is_signature() || err.is_corrupt());
        }
        let mut tampered = signature.clone();
        *tampered.last_mut().unwrap() ^= 0x01;
        assert!(verify(&tampered, data, &public).unwrap_err().is_signature());
        assert!(verify(&signature[..signature.len() - 1], data, &public).unwrap_err().is_corrupt());
        let mut junk = signature.clone();
        junk.push(0);
        assert!(verify(&junk, data, &public).unwrap_err().is_corrupt());
        assert!(verify(&[], data, &public).unwrap_err().is_corrupt());
        assert!(verify(&[0, 0, 0, 0], data, &public).unwrap_err().is_signature());
        Ok(())
    }

    #[test]
    fn mpi_encoding_works() {
        let mut out = Vec::new();
        write_mpi(&mut out, &BigUint::from(0x1FFu32)).unwrap();
        assert_eq!(vec![0, 9, 1, 0xFF], out);
        let (n, rest) = read_mpi(&[0, 9, 1, 0xFF, 7]).unwrap();
        assert_eq!(BigUint::from(0x1FFu32), n);
        assert_eq!(&[7], rest);
        assert!(read_mpi(&[0, 10, 1, 0xFF]).is_none());
        assert!(read_mpi(&[0, 9, 1]).is_none());
    }

    #[test]
    fn bad_keys_are_corrupt() {
        assert!(PublicKey::from_be_bytes(&[1], &[1], &[0], &[1]).unwrap_err().is_corrupt());
    }
}
