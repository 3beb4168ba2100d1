//! TLV wire format for hello packets.
//!
//! Handles encoding and parsing of the three packet kinds the hello protocol
//! exchanges: probes (hello interests), signed reply data, and nacks. Names
//! are nested TLV sequences; a name can also be embedded opaquely as a single
//! component value, which is how a probe carries its sender's router name.

use core::time::Duration;

use crate::constants::tlv;
use crate::error::WireError;
use crate::name::{NameComponent, RouterName, decode_nonneg, encode_nonneg};

/// Largest TLV length the codec will accept; hello packets are small.
const MAX_TLV_LENGTH: u64 = 64 * 1024;

/// A probe (hello interest) asking a neighbor to confirm liveness.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Probe {
    pub name: RouterName,
    pub nonce: u32,
    pub lifetime: Duration,
    pub must_be_fresh: bool,
    pub can_be_prefix: bool,
}

/// A signed reply to a probe.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct DataPacket {
    pub name: RouterName,
    pub freshness: Duration,
    pub content: Vec<u8>,
    pub key_locator: Option<RouterName>,
    pub signature: Vec<u8>,
}

/// Reason codes for a nack, mirroring the forwarder's vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackReason {
    Congestion,
    Duplicate,
    NoRoute,
}

impl NackReason {
    fn code(self) -> u64 {
        match self {
            NackReason::Congestion => 50,
            NackReason::Duplicate => 100,
            NackReason::NoRoute => 150,
        }
    }

    fn from_code(code: u64) -> Result<Self, WireError> {
        match code {
            50 => Ok(NackReason::Congestion),
            100 => Ok(NackReason::Duplicate),
            150 => Ok(NackReason::NoRoute),
            other => Err(WireError::UnknownNackReason(other)),
        }
    }
}

/// A negative acknowledgment for a named probe.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct Nack {
    pub name: RouterName,
    pub reason: NackReason,
}

/// Any packet the hello protocol can receive from a face.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Packet {
    Probe(Probe),
    Data(DataPacket),
    Nack(Nack),
}

impl Packet {
    /// Parse a packet from wire bytes, requiring full consumption.
    #[must_use = "parsing may fail; check the Result"]
    pub fn parse(raw: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(raw);
        let (typ, payload) = r.read_tlv()?;
        r.expect_end()?;
        let packet = match typ {
            tlv::PROBE => Packet::Probe(Probe::parse_payload(payload)?),
            tlv::DATA => Packet::Data(DataPacket::parse_payload(payload)?),
            tlv::NACK => Packet::Nack(Nack::parse_payload(payload)?),
            other => return Err(WireError::UnknownPacketType(other)),
        };
        Ok(packet)
    }

    /// Serialize the packet to wire format.
    #[must_use = "serialization produces a new Vec without modifying the packet"]
    pub fn serialize(&self) -> Vec<u8> {
        match self {
            Packet::Probe(p) => p.serialize(),
            Packet::Data(d) => d.serialize(),
            Packet::Nack(n) => n.serialize(),
        }
    }
}

impl Probe {
    pub fn serialize(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        write_name(&mut payload, &self.name);
        if self.can_be_prefix {
            write_tlv(&mut payload, tlv::CAN_BE_PREFIX, &[]);
        }
        if self.must_be_fresh {
            write_tlv(&mut payload, tlv::MUST_BE_FRESH, &[]);
        }
        write_tlv(&mut payload, tlv::NONCE, &self.nonce.to_be_bytes());
        write_tlv(
            &mut payload,
            tlv::PROBE_LIFETIME,
            &encode_nonneg(self.lifetime.as_millis() as u64),
        );
        wrap(tlv::PROBE, payload)
    }

    fn parse_payload(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let name = r.read_name()?;
        let can_be_prefix = r.take_flag(tlv::CAN_BE_PREFIX)?;
        let must_be_fresh = r.take_flag(tlv::MUST_BE_FRESH)?;
        let nonce_bytes = r.expect_tlv(tlv::NONCE)?;
        let nonce = u32::from_be_bytes(
            nonce_bytes
                .try_into()
                .map_err(|_| WireError::BadNonceWidth(nonce_bytes.len()))?,
        );
        let lifetime_ms = r.read_nonneg(tlv::PROBE_LIFETIME)?;
        r.expect_end()?;
        Ok(Probe {
            name,
            nonce,
            lifetime: Duration::from_millis(lifetime_ms),
            must_be_fresh,
            can_be_prefix,
        })
    }
}

impl DataPacket {
    /// The bytes the signature covers: everything up to the signature value.
    #[must_use = "returns the signed bytes without modifying the packet"]
    pub fn signed_portion(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_name(&mut out, &self.name);
        write_tlv(
            &mut out,
            tlv::FRESHNESS_PERIOD,
            &encode_nonneg(self.freshness.as_millis() as u64),
        );
        write_tlv(&mut out, tlv::CONTENT, &self.content);
        out.extend_from_slice(&self.signature_info());
        out
    }

    fn signature_info(&self) -> Vec<u8> {
        let mut info = Vec::new();
        write_tlv(
            &mut info,
            tlv::SIGNATURE_TYPE,
            &encode_nonneg(tlv::SIGNATURE_ED25519),
        );
        if let Some(ref locator) = self.key_locator {
            let mut inner = Vec::new();
            write_name(&mut inner, locator);
            write_tlv(&mut info, tlv::KEY_LOCATOR, &inner);
        }
        let mut out = Vec::new();
        write_tlv(&mut out, tlv::SIGNATURE_INFO, &info);
        out
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut payload = self.signed_portion();
        write_tlv(&mut payload, tlv::SIGNATURE_VALUE, &self.signature);
        wrap(tlv::DATA, payload)
    }

    fn parse_payload(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let name = r.read_name()?;
        let freshness_ms = r.read_nonneg(tlv::FRESHNESS_PERIOD)?;
        let content = r.expect_tlv(tlv::CONTENT)?.to_vec();

        let info = r.expect_tlv(tlv::SIGNATURE_INFO)?;
        let mut ri = Reader::new(info);
        let sig_type = ri.read_nonneg(tlv::SIGNATURE_TYPE)?;
        if sig_type != tlv::SIGNATURE_ED25519 {
            return Err(WireError::UnexpectedType {
                expected: tlv::SIGNATURE_ED25519,
                found: sig_type,
            });
        }
        let key_locator = if ri.remaining() > 0 {
            let inner = ri.expect_tlv(tlv::KEY_LOCATOR)?;
            let mut rl = Reader::new(inner);
            let locator = rl.read_name()?;
            rl.expect_end()?;
            Some(locator)
        } else {
            None
        };
        ri.expect_end()?;

        let signature = r.expect_tlv(tlv::SIGNATURE_VALUE)?.to_vec();
        r.expect_end()?;
        Ok(DataPacket {
            name,
            freshness: Duration::from_millis(freshness_ms),
            content,
            key_locator,
            signature,
        })
    }
}

impl Nack {
    pub fn serialize(&self) -> Vec<u8> {
        let mut payload = Vec::new();
        write_name(&mut payload, &self.name);
        write_tlv(
            &mut payload,
            tlv::NACK_REASON,
            &encode_nonneg(self.reason.code()),
        );
        wrap(tlv::NACK, payload)
    }

    fn parse_payload(payload: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(payload);
        let name = r.read_name()?;
        let reason = NackReason::from_code(r.read_nonneg(tlv::NACK_REASON)?)?;
        r.expect_end()?;
        Ok(Nack { name, reason })
    }
}

impl RouterName {
    /// Encode this name as a standalone TLV blob.
    ///
    /// Probes embed their sender's name this way, as the opaque value of the
    /// probe name's final component.
    #[must_use = "encoding produces a new Vec without modifying the name"]
    pub fn wire_encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        write_name(&mut out, self);
        out
    }

    /// Decode a name from a standalone TLV blob, requiring full consumption.
    #[must_use = "decoding may fail; check the Result"]
    pub fn wire_decode(raw: &[u8]) -> Result<Self, WireError> {
        let mut r = Reader::new(raw);
        let name = r.read_name()?;
        r.expect_end()?;
        Ok(name)
    }
}

// ---------------------------------------------------------------------------
// TLV primitives
// ---------------------------------------------------------------------------

fn write_varint(out: &mut Vec<u8>, v: u64) {
    if v < 253 {
        out.push(v as u8);
    } else if v <= 0xFFFF {
        out.push(253);
        out.extend_from_slice(&(v as u16).to_be_bytes());
    } else {
        out.push(254);
        out.extend_from_slice(&(v as u32).to_be_bytes());
    }
}

fn write_tlv(out: &mut Vec<u8>, typ: u64, payload: &[u8]) {
    write_varint(out, typ);
    write_varint(out, payload.len() as u64);
    out.extend_from_slice(payload);
}

fn wrap(typ: u64, payload: Vec<u8>) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    write_tlv(&mut out, typ, &payload);
    out
}

fn write_name(out: &mut Vec<u8>, name: &RouterName) {
    let mut inner = Vec::new();
    for component in name.iter() {
        write_tlv(&mut inner, component.typ(), component.value());
    }
    write_tlv(out, tlv::NAME, &inner);
}

/// Cursor over a byte slice with TLV-aware reads.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        if self.remaining() < n {
            return Err(WireError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn read_varint(&mut self) -> Result<u64, WireError> {
        let first = self.take(1)?[0];
        match first {
            0..=252 => Ok(u64::from(first)),
            253 => {
                let b = self.take(2)?;
                Ok(u64::from(u16::from_be_bytes([b[0], b[1]])))
            }
            254 => {
                let b = self.take(4)?;
                Ok(u64::from(u32::from_be_bytes([b[0], b[1], b[2], b[3]])))
            }
            255 => {
                let b = self.take(8)?;
                let arr: [u8; 8] = b.try_into().expect("slice is exactly 8 bytes");
                Ok(u64::from_be_bytes(arr))
            }
        }
    }

    /// Read the next TLV, returning its type and payload.
    fn read_tlv(&mut self) -> Result<(u64, &'a [u8]), WireError> {
        let typ = self.read_varint()?;
        let len = self.read_varint()?;
        if len > MAX_TLV_LENGTH {
            return Err(WireError::LengthOverflow(len));
        }
        let payload = self.take(len as usize)?;
        Ok((typ, payload))
    }

    /// Read the next TLV, requiring a specific type.
    fn expect_tlv(&mut self, expected: u64) -> Result<&'a [u8], WireError> {
        let (typ, payload) = self.read_tlv()?;
        if typ != expected {
            return Err(WireError::UnexpectedType {
                expected,
                found: typ,
            });
        }
        Ok(payload)
    }

    /// Consume a zero-length flag TLV of the given type, if present next.
    fn take_flag(&mut self, typ: u64) -> Result<bool, WireError> {
        if self.peek_type()? == Some(typ) {
            self.expect_tlv(typ)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn peek_type(&mut self) -> Result<Option<u64>, WireError> {
        if self.remaining() == 0 {
            return Ok(None);
        }
        let saved = self.pos;
        let typ = self.read_varint()?;
        self.pos = saved;
        Ok(Some(typ))
    }

    fn read_nonneg(&mut self, typ: u64) -> Result<u64, WireError> {
        let payload = self.expect_tlv(typ)?;
        decode_nonneg(payload).ok_or(WireError::BadIntegerWidth(payload.len()))
    }

    fn read_name(&mut self) -> Result<RouterName, WireError> {
        let payload = self.expect_tlv(tlv::NAME)?;
        let mut r = Reader::new(payload);
        let mut name = RouterName::new();
        while r.remaining() > 0 {
            let (typ, value) = r.read_tlv()?;
            name.push(NameComponent::new(typ, value.to_vec()));
        }
        Ok(name)
    }

    fn expect_end(&self) -> Result<(), WireError> {
        if self.remaining() > 0 {
            return Err(WireError::TrailingBytes {
                count: self.remaining(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(uri: &str) -> RouterName {
        RouterName::from_uri(uri).unwrap()
    }

    fn make_probe() -> Probe {
        let probe_name = name("/site/router-b")
            .append_str("NLSR")
            .append_str("INFO")
            .append(NameComponent::generic(name("/site/router-a").wire_encode()));
        Probe {
            name: probe_name,
            nonce: 0xDEAD_BEEF,
            lifetime: Duration::from_secs(15),
            must_be_fresh: true,
            can_be_prefix: true,
        }
    }

    fn make_data() -> DataPacket {
        DataPacket {
            name: make_probe().name.append(NameComponent::version(7)),
            freshness: Duration::ZERO,
            content: b"INFO".to_vec(),
            key_locator: Some(name("/site/router-b/KEY")),
            signature: vec![0xAB; 64],
        }
    }

    // === Round trips ===

    #[test]
    fn probe_roundtrip() {
        let probe = make_probe();
        let raw = probe.serialize();
        let parsed = Packet::parse(&raw).unwrap();
        assert_eq!(parsed, Packet::Probe(probe));
    }

    #[test]
    fn probe_roundtrip_without_flags() {
        let mut probe = make_probe();
        probe.must_be_fresh = false;
        probe.can_be_prefix = false;
        let raw = probe.serialize();
        assert_eq!(Packet::parse(&raw).unwrap(), Packet::Probe(probe));
    }

    #[test]
    fn data_roundtrip() {
        let data = make_data();
        let raw = data.serialize();
        assert_eq!(Packet::parse(&raw).unwrap(), Packet::Data(data));
    }

    #[test]
    fn data_roundtrip_without_key_locator() {
        let mut data = make_data();
        data.key_locator = None;
        let raw = data.serialize();
        assert_eq!(Packet::parse(&raw).unwrap(), Packet::Data(data));
    }

    #[test]
    fn nack_roundtrip() {
        let nack = Nack {
            name: make_probe().name,
            reason: NackReason::NoRoute,
        };
        let raw = nack.serialize();
        assert_eq!(Packet::parse(&raw).unwrap(), Packet::Nack(nack));
    }

    #[test]
    fn embedded_name_roundtrip() {
        let n = name("/ndn/edu/site/router-a");
        assert_eq!(RouterName::wire_decode(&n.wire_encode()).unwrap(), n);
    }

    // === Malformed input ===

    #[test]
    fn parse_rejects_unknown_outer_type() {
        let raw = wrap(0x42, vec![]);
        assert!(matches!(
            Packet::parse(&raw),
            Err(WireError::UnknownPacketType(0x42))
        ));
    }

    #[test]
    fn parse_rejects_truncation_at_every_length() {
        let raw = make_data().serialize();
        for len in 0..raw.len() {
            assert!(
                Packet::parse(&raw[..len]).is_err(),
                "truncation to {len} bytes should fail"
            );
        }
    }

    #[test]
    fn parse_rejects_trailing_bytes() {
        let mut raw = make_probe().serialize();
        raw.push(0x00);
        assert!(matches!(
            Packet::parse(&raw),
            Err(WireError::TrailingBytes { count: 1 })
        ));
    }

    #[test]
    fn parse_rejects_oversized_tlv_length() {
        let mut raw = Vec::new();
        write_varint(&mut raw, tlv::PROBE);
        raw.push(254);
        raw.extend_from_slice(&u32::MAX.to_be_bytes());
        assert!(matches!(
            Packet::parse(&raw),
            Err(WireError::LengthOverflow(_))
        ));
    }

    #[test]
    fn parse_rejects_bad_nonce_width() {
        let mut payload = Vec::new();
        write_name(&mut payload, &name("/a"));
        write_tlv(&mut payload, tlv::NONCE, &[1, 2]);
        write_tlv(&mut payload, tlv::PROBE_LIFETIME, &encode_nonneg(1000));
        let raw = wrap(tlv::PROBE, payload);
        assert!(matches!(
            Packet::parse(&raw),
            Err(WireError::BadNonceWidth(2))
        ));
    }

    #[test]
    fn parse_rejects_unknown_nack_reason() {
        let mut payload = Vec::new();
        write_name(&mut payload, &name("/a"));
        write_tlv(&mut payload, tlv::NACK_REASON, &encode_nonneg(7));
        let raw = wrap(tlv::NACK, payload);
        assert!(matches!(
            Packet::parse(&raw),
            Err(WireError::UnknownNackReason(7))
        ));
    }

    // === Signed portion ===

    #[test]
    fn signed_portion_excludes_signature_value() {
        let mut data = make_data();
        let before = data.signed_portion();
        data.signature = vec![0xFF; 64];
        // Changing the signature must not change the signed bytes.
        assert_eq!(before, data.signed_portion());
        // But it must change the full encoding.
        assert_ne!(make_data().serialize(), data.serialize());
    }

    #[test]
    fn signed_portion_covers_name_and_content() {
        let data = make_data();
        let mut renamed = data.clone();
        renamed.name = name("/other").append(NameComponent::version(7));
        assert_ne!(data.signed_portion(), renamed.signed_portion());

        let mut altered = data.clone();
        altered.content = b"XXXX".to_vec();
        assert_ne!(data.signed_portion(), altered.signed_portion());
    }

    // === Varint widths ===

    #[test]
    fn varint_two_byte_form() {
        let mut out = Vec::new();
        write_varint(&mut out, 300);
        assert_eq!(out, vec![253, 0x01, 0x2C]);
        let mut r = Reader::new(&out);
        assert_eq!(r.read_varint().unwrap(), 300);
    }

    #[test]
    fn varint_boundary_252_vs_253() {
        for v in [252u64, 253, 65535, 65536] {
            let mut out = Vec::new();
            write_varint(&mut out, v);
            let mut r = Reader::new(&out);
            assert_eq!(r.read_varint().unwrap(), v, "width roundtrip for {v}");
        }
    }
}
