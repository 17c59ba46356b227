//! Packet match criteria.
//!
//! A [`Match`] is a set of typed fields; an absent field is a wildcard. Two
//! matches *intersect* when some packet could satisfy both, which is what
//! decides whether a container flow admits a requested flow. The
//! *intersection* is the narrowest match satisfying both sides and becomes
//! the match actually programmed on the device.

use std::collections::BTreeMap;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use super::node::PortId;

// =============================================================================
// Field values
// =============================================================================

/// A 48-bit layer 2 address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MacAddr(pub [u8; 6]);

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// An IP network prefix. Host bits are cleared on construction so that equal
/// networks compare and hash equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IpPrefix {
    addr: IpAddr,
    len: u8,
}

impl IpPrefix {
    /// Returns `None` when `len` exceeds the address width.
    pub fn new(addr: IpAddr, len: u8) -> Option<Self> {
        let width = width_of(&addr);
        if len > width {
            return None;
        }
        let raw = raw_bits(&addr);
        let mask = if len == 0 {
            0
        } else {
            (u128::MAX << (128 - len as u32)) >> (128 - width as u32)
        };
        let addr = match addr {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from((raw & mask) as u32)),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(raw & mask)),
        };
        Some(Self { addr, len })
    }

    /// A single-host prefix.
    pub fn host(addr: IpAddr) -> Self {
        let len = width_of(&addr);
        Self { addr, len }
    }

    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    pub fn prefix_len(&self) -> u8 {
        self.len
    }

    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }

    /// True when some address lies in both prefixes. Mixed families never overlap.
    pub fn overlaps(&self, other: &IpPrefix) -> bool {
        if self.addr.is_ipv4() != other.addr.is_ipv4() {
            return false;
        }
        let common = self.len.min(other.len);
        self.leading_bits(common) == other.leading_bits(common)
    }

    /// The more specific of two overlapping prefixes.
    pub fn narrower(self, other: IpPrefix) -> IpPrefix {
        if other.len > self.len {
            other
        } else {
            self
        }
    }

    fn leading_bits(&self, count: u8) -> u128 {
        if count == 0 {
            return 0;
        }
        raw_bits(&self.addr) >> (width_of(&self.addr) - count)
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

fn width_of(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn raw_bits(addr: &IpAddr) -> u128 {
    match addr {
        IpAddr::V4(a) => u32::from(*a) as u128,
        IpAddr::V6(a) => u128::from(*a),
    }
}

// =============================================================================
// Match fields
// =============================================================================

/// The kind of a match field. Ordering is the display order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MatchType {
    InPort,
    DlSrc,
    DlDst,
    DlType,
    DlVlan,
    DlVlanPriority,
    NwSrc,
    NwDst,
    NwTos,
    NwProto,
    TpSrc,
    TpDst,
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MatchType::InPort => "IN_PORT",
            MatchType::DlSrc => "DL_SRC",
            MatchType::DlDst => "DL_DST",
            MatchType::DlType => "DL_TYPE",
            MatchType::DlVlan => "DL_VLAN",
            MatchType::DlVlanPriority => "DL_VLAN_PR",
            MatchType::NwSrc => "NW_SRC",
            MatchType::NwDst => "NW_DST",
            MatchType::NwTos => "NW_TOS",
            MatchType::NwProto => "NW_PROTO",
            MatchType::TpSrc => "TP_SRC",
            MatchType::TpDst => "TP_DST",
        };
        f.write_str(name)
    }
}

/// A single match criterion with its value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchField {
    InPort(PortId),
    DlSrc(MacAddr),
    DlDst(MacAddr),
    DlType(u16),
    DlVlan(u16),
    DlVlanPriority(u8),
    NwSrc(IpPrefix),
    NwDst(IpPrefix),
    NwTos(u8),
    NwProto(u8),
    TpSrc(u16),
    TpDst(u16),
}

impl MatchField {
    pub fn match_type(&self) -> MatchType {
        match self {
            MatchField::InPort(_) => MatchType::InPort,
            MatchField::DlSrc(_) => MatchType::DlSrc,
            MatchField::DlDst(_) => MatchType::DlDst,
            MatchField::DlType(_) => MatchType::DlType,
            MatchField::DlVlan(_) => MatchType::DlVlan,
            MatchField::DlVlanPriority(_) => MatchType::DlVlanPriority,
            MatchField::NwSrc(_) => MatchType::NwSrc,
            MatchField::NwDst(_) => MatchType::NwDst,
            MatchField::NwTos(_) => MatchType::NwTos,
            MatchField::NwProto(_) => MatchType::NwProto,
            MatchField::TpSrc(_) => MatchType::TpSrc,
            MatchField::TpDst(_) => MatchType::TpDst,
        }
    }

    /// Whether a packet could satisfy both values of the same field type.
    fn compatible_with(&self, other: &MatchField) -> bool {
        match (self, other) {
            (MatchField::NwSrc(a), MatchField::NwSrc(b))
            | (MatchField::NwDst(a), MatchField::NwDst(b)) => a.overlaps(b),
            _ => self == other,
        }
    }

    /// Combined constraint of two compatible values of the same field type.
    fn narrowed_with(&self, other: &MatchField) -> MatchField {
        match (self, other) {
            (MatchField::NwSrc(a), MatchField::NwSrc(b)) => MatchField::NwSrc(a.narrower(*b)),
            (MatchField::NwDst(a), MatchField::NwDst(b)) => MatchField::NwDst(a.narrower(*b)),
            _ => self.clone(),
        }
    }
}

impl fmt::Display for MatchField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=", self.match_type())?;
        match self {
            MatchField::InPort(p) => write!(f, "{}", p),
            MatchField::DlSrc(m) | MatchField::DlDst(m) => write!(f, "{}", m),
            MatchField::DlType(t) => write!(f, "0x{:x}", t),
            MatchField::DlVlan(v) | MatchField::TpSrc(v) | MatchField::TpDst(v) => {
                write!(f, "{}", v)
            }
            MatchField::DlVlanPriority(v) | MatchField::NwTos(v) | MatchField::NwProto(v) => {
                write!(f, "{}", v)
            }
            MatchField::NwSrc(p) | MatchField::NwDst(p) => write!(f, "{}", p),
        }
    }
}

// =============================================================================
// Match
// =============================================================================

/// A set of match fields, at most one per [`MatchType`]. Empty matches all traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Match {
    fields: BTreeMap<MatchType, MatchField>,
}

impl Match {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`Match::set_field`].
    pub fn with(mut self, field: MatchField) -> Self {
        self.set_field(field);
        self
    }

    /// Sets a field, replacing any previous value of the same type.
    pub fn set_field(&mut self, field: MatchField) {
        self.fields.insert(field.match_type(), field);
    }

    pub fn clear_field(&mut self, match_type: MatchType) -> Option<MatchField> {
        self.fields.remove(&match_type)
    }

    pub fn field(&self, match_type: MatchType) -> Option<&MatchField> {
        self.fields.get(&match_type)
    }

    pub fn fields(&self) -> impl Iterator<Item = &MatchField> {
        self.fields.values()
    }

    pub fn is_any(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn in_port(&self) -> Option<&PortId> {
        match self.fields.get(&MatchType::InPort) {
            Some(MatchField::InPort(port)) => Some(port),
            _ => None,
        }
    }

    /// True when at least one packet satisfies both matches.
    ///
    /// Fields present on only one side never conflict.
    pub fn intersects(&self, other: &Match) -> bool {
        if self.is_any() || other.is_any() {
            return true;
        }
        self.fields.iter().all(|(ty, mine)| match other.fields.get(ty) {
            Some(theirs) => mine.compatible_with(theirs),
            None => true,
        })
    }

    /// The narrowest match satisfied exactly by packets matching both sides,
    /// or `None` when the two are disjoint.
    pub fn intersection(&self, other: &Match) -> Option<Match> {
        if !self.intersects(other) {
            return None;
        }
        let mut merged = self.clone();
        for (ty, theirs) in &other.fields {
            let value = match merged.fields.get(ty) {
                Some(mine) => mine.narrowed_with(theirs),
                None => theirs.clone(),
            };
            merged.fields.insert(*ty, value);
        }
        Some(merged)
    }
}

impl fmt::Display for Match {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Match[")?;
        for (i, field) in self.fields.values().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", field)?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NodeId;

    fn v4(s: &str, len: u8) -> IpPrefix {
        IpPrefix::new(s.parse().unwrap(), len).unwrap()
    }

    #[test]
    fn test_prefix_clears_host_bits() {
        assert_eq!(v4("10.1.2.3", 8), v4("10.0.0.0", 8));
        assert_eq!(v4("10.1.2.3", 8).to_string(), "10.0.0.0/8");
        assert!(IpPrefix::new("10.0.0.1".parse().unwrap(), 33).is_none());
    }

    #[test]
    fn test_prefix_overlap() {
        assert!(v4("10.0.0.0", 8).overlaps(&v4("10.1.0.0", 16)));
        assert!(!v4("10.0.0.0", 8).overlaps(&v4("11.0.0.0", 8)));
        assert!(v4("0.0.0.0", 0).overlaps(&v4("192.168.1.1", 32)));

        let v6 = IpPrefix::new("2001:db8::".parse().unwrap(), 32).unwrap();
        assert!(!v4("10.0.0.0", 8).overlaps(&v6));
    }

    #[test]
    fn test_empty_match_intersects_everything() {
        let any = Match::new();
        let web = Match::new().with(MatchField::TpDst(80));
        assert!(any.intersects(&web));
        assert!(web.intersects(&any));
        assert_eq!(any.intersection(&web), Some(web));
    }

    #[test]
    fn test_conflicting_fields_do_not_intersect() {
        let a = Match::new().with(MatchField::DlVlan(10));
        let b = Match::new().with(MatchField::DlVlan(20));
        assert!(!a.intersects(&b));
        assert!(a.intersection(&b).is_none());
    }

    #[test]
    fn test_intersection_unions_fields_and_narrows_prefixes() {
        let node = NodeId::new("sw1");
        let requested = Match::new()
            .with(MatchField::InPort(node.port(1)))
            .with(MatchField::NwSrc(v4("10.0.0.0", 8)));
        let container = Match::new()
            .with(MatchField::DlVlan(100))
            .with(MatchField::NwSrc(v4("10.20.0.0", 16)));

        let merged = requested.intersection(&container).unwrap();
        assert_eq!(merged.in_port(), Some(&node.port(1)));
        assert_eq!(merged.field(MatchType::DlVlan), Some(&MatchField::DlVlan(100)));
        assert_eq!(
            merged.field(MatchType::NwSrc),
            Some(&MatchField::NwSrc(v4("10.20.0.0", 16)))
        );
    }
}
