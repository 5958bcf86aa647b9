use std::fmt;

/// Identifies a network interface: the switch it belongs to and its port number.
///
/// Interface ids are totally ordered, and that order fixes the order in which endpoint
/// pools are locked.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InterfaceId {
    switch: String,
    port: u32,
}

impl InterfaceId {
    /// Creates the id of `port` on `switch`.
    pub fn new(switch: impl Into<String>, port: u32) -> Self {
        Self { switch: switch.into(), port }
    }

    /// The switch (datapath) id.
    #[inline]
    pub fn switch(&self) -> &str {
        &self.switch
    }

    /// The port number on the switch.
    #[inline]
    pub const fn port(&self) -> u32 {
        self.port
    }
}

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.switch, self.port)
    }
}

/// Identifies a link by its two interfaces. The pair is stored sorted, so the id does not
/// depend on the order the endpoints were given in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(InterfaceId, InterfaceId);

impl LinkId {
    /// Creates the id of the link between `a` and `b`, in either order.
    pub fn new(a: InterfaceId, b: InterfaceId) -> Self {
        if a <= b {
            Self(a, b)
        } else {
            Self(b, a)
        }
    }

    /// Returns the endpoints, lowest first.
    #[inline]
    pub const fn interfaces(&self) -> (&InterfaceId, &InterfaceId) {
        (&self.0, &self.1)
    }
}

impl fmt::Display for LinkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.0, self.1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_id_is_order_independent() {
        let a = InterfaceId::new("00:00:00:00:00:00:00:01", 1);
        let b = InterfaceId::new("00:00:00:00:00:00:00:02", 1);

        assert_eq!(LinkId::new(a.clone(), b.clone()), LinkId::new(b.clone(), a.clone()));
        assert_eq!(LinkId::new(b.clone(), a.clone()).interfaces(), (&a, &b));
        assert_eq!(a.to_string(), "00:00:00:00:00:00:00:01:1");
    }

    #[test]
    fn interface_order_uses_switch_then_port() {
        let a = InterfaceId::new("s1", 10);
        let b = InterfaceId::new("s1", 2);
        let c = InterfaceId::new("s2", 1);

        assert!(b < a);
        assert!(a < c);
    }
}
