//! The lifecycle command message passed at every class-driver invocation.
//!
//! The device stack drives a class driver through exactly one call
//! surface: a [`ClassCommand`] handed to the driver's entry point. The
//! command kind selects the lifecycle transition; the remaining fields
//! are payload and are only meaningful for the kinds that read them
//! (class/subclass/protocol for Query, endpoint list for Activate and
//! Change, the in-flight transfer for Request).

use heapless::Vec;

use crate::config;

/// Command kinds, with the stable wire codes used by the stack core.
///
/// Codes arriving from the stack are decoded with [`ClassRequest::from_raw`];
/// an out-of-range code never reaches a driver and is reported upward as
/// `NotSupported` by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum ClassRequest {
    /// Create the per-interface runtime instance.
    Initialize = 1,
    /// Enumeration probe: does this driver serve the interface?
    Query = 2,
    /// Mount the interface: claim endpoints, start the worker.
    Activate = 3,
    /// Switch to another alternate setting of the interface.
    Change = 4,
    /// Unmount the interface: cancel the worker, release endpoints.
    Deactivate = 5,
    /// Forward a control-endpoint transfer to the class handler.
    Request = 6,
    /// Destroy the per-interface runtime instance.
    Uninitialize = 7,
}

impl ClassRequest {
    /// Decode a raw command code from the stack core.
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Initialize),
            2 => Some(Self::Query),
            3 => Some(Self::Activate),
            4 => Some(Self::Change),
            5 => Some(Self::Deactivate),
            6 => Some(Self::Request),
            7 => Some(Self::Uninitialize),
            _ => None,
        }
    }

    /// The wire code for this command kind.
    pub const fn raw(self) -> u8 {
        self as u8
    }
}

/// One endpoint address as declared by an endpoint descriptor.
///
/// Bit 7 is the direction (set = IN), bits 3..0 the endpoint number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct EndpointAddress(pub u8);

impl EndpointAddress {
    /// Device-to-host endpoint with the given number.
    pub const fn ep_in(number: u8) -> Self {
        Self(0x80 | (number & 0x0F))
    }

    /// Host-to-device endpoint with the given number.
    pub const fn ep_out(number: u8) -> Self {
        Self(number & 0x0F)
    }

    /// `true` for device-to-host endpoints.
    pub const fn is_in(self) -> bool {
        self.0 & 0x80 != 0
    }

    /// Endpoint number without the direction bit.
    pub const fn number(self) -> u8 {
        self.0 & 0x0F
    }
}

/// One class/subclass/protocol triple a class driver answers Query for.
///
/// A driver advertises one identity per mode it serves. `subclass` and
/// `protocol` may be wildcards: mass-storage style drivers match on the
/// class code alone, audio-style drivers pin the subclass per identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ClassIdentity {
    pub class: u8,
    pub subclass: Option<u8>,
    pub protocol: Option<u8>,
}

impl ClassIdentity {
    /// Match on class code alone.
    pub const fn class(class: u8) -> Self {
        Self {
            class,
            subclass: None,
            protocol: None,
        }
    }

    /// Match on class and subclass.
    pub const fn subclass(class: u8, subclass: u8) -> Self {
        Self {
            class,
            subclass: Some(subclass),
            protocol: None,
        }
    }

    /// Match on the full triple.
    pub const fn protocol(class: u8, subclass: u8, protocol: u8) -> Self {
        Self {
            class,
            subclass: Some(subclass),
            protocol: Some(protocol),
        }
    }

    /// `true` if the descriptor codes satisfy this identity.
    pub fn matches(&self, class: u8, subclass: u8, protocol: u8) -> bool {
        self.class == class
            && self.subclass.map_or(true, |s| s == subclass)
            && self.protocol.map_or(true, |p| p == protocol)
    }
}

/// The 8-byte SETUP stage of a control transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SetupPacket {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub length: u16,
}

/// In-flight control transfer handed to a class handler via Request.
///
/// For OUT transfers `data` holds the received payload; for IN
/// transfers the handler writes the response into `data` before
/// returning. Payloads are bounded by
/// [`MAX_CONTROL_PAYLOAD`](config::MAX_CONTROL_PAYLOAD).
#[derive(Debug, Default)]
pub struct ControlTransfer {
    pub setup: SetupPacket,
    pub data: Vec<u8, { config::MAX_CONTROL_PAYLOAD }>,
}

impl ControlTransfer {
    /// Fresh transfer state for the given SETUP packet.
    pub fn new(setup: SetupPacket) -> Self {
        Self {
            setup,
            data: Vec::new(),
        }
    }
}

/// The message passed at every invocation of a class-driver entry point.
///
/// Fields other than `request` default to zero/empty; the constructors
/// below fill in exactly what each command kind carries.
#[derive(Debug, Default)]
pub struct ClassCommand<'a> {
    /// Which lifecycle transition (or query) is being issued.
    pub request: Option<ClassRequest>,
    /// Interface class code under evaluation (Query).
    pub class_code: u8,
    /// Interface subclass code under evaluation (Query).
    pub subclass_code: u8,
    /// Interface protocol code under evaluation (Query).
    pub protocol_code: u8,
    /// Interface number the command addresses.
    pub interface_number: u8,
    /// Target alternate setting (Activate / Change).
    pub alternate_setting: u8,
    /// Endpoints declared by the target setting (Activate / Change).
    pub endpoints: &'a [EndpointAddress],
    /// In-flight control transfer (Request only).
    pub transfer: Option<&'a mut ControlTransfer>,
}

impl<'a> ClassCommand<'a> {
    fn kind(request: ClassRequest) -> Self {
        Self {
            request: Some(request),
            ..Self::default()
        }
    }

    /// Build a command from a raw wire code. Unknown codes yield a
    /// command with no decoded request, which dispatch reports as
    /// `NotSupported`.
    pub fn from_raw(raw: u8) -> Self {
        Self {
            request: ClassRequest::from_raw(raw),
            ..Self::default()
        }
    }

    /// Enumeration probe against the given interface descriptor codes.
    pub fn query(class: u8, subclass: u8, protocol: u8) -> Self {
        Self {
            class_code: class,
            subclass_code: subclass,
            protocol_code: protocol,
            ..Self::kind(ClassRequest::Query)
        }
    }

    /// Create the runtime instance for `interface_number`.
    pub fn initialize(interface_number: u8) -> Self {
        Self {
            interface_number,
            ..Self::kind(ClassRequest::Initialize)
        }
    }

    /// Destroy the runtime instance.
    pub fn uninitialize() -> Self {
        Self::kind(ClassRequest::Uninitialize)
    }

    /// Mount the default setting with the given declared endpoints.
    pub fn activate(endpoints: &'a [EndpointAddress]) -> Self {
        Self {
            endpoints,
            ..Self::kind(ClassRequest::Activate)
        }
    }

    /// Switch to `alternate_setting`, whose descriptors declare `endpoints`.
    pub fn change(alternate_setting: u8, endpoints: &'a [EndpointAddress]) -> Self {
        Self {
            alternate_setting,
            endpoints,
            ..Self::kind(ClassRequest::Change)
        }
    }

    /// Unmount the interface.
    pub fn deactivate() -> Self {
        Self::kind(ClassRequest::Deactivate)
    }

    /// Forward a control transfer to the class handler.
    pub fn request(transfer: &'a mut ControlTransfer) -> Self {
        Self {
            transfer: Some(transfer),
            ..Self::kind(ClassRequest::Request)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_codes_roundtrip() {
        for raw in 1..=7u8 {
            let req = ClassRequest::from_raw(raw).unwrap();
            assert_eq!(req.raw(), raw);
        }
    }

    #[test]
    fn unknown_request_codes_are_rejected() {
        assert!(ClassRequest::from_raw(0).is_none());
        assert!(ClassRequest::from_raw(8).is_none());
        assert!(ClassRequest::from_raw(0xFF).is_none());
    }

    #[test]
    fn command_from_unknown_raw_has_no_request() {
        assert!(ClassCommand::from_raw(42).request.is_none());
        assert_eq!(
            ClassCommand::from_raw(2).request,
            Some(ClassRequest::Query)
        );
    }

    #[test]
    fn endpoint_address_direction_and_number() {
        let ep_in = EndpointAddress::ep_in(3);
        assert_eq!(ep_in.0, 0x83);
        assert!(ep_in.is_in());
        assert_eq!(ep_in.number(), 3);

        let ep_out = EndpointAddress::ep_out(2);
        assert_eq!(ep_out.0, 0x02);
        assert!(!ep_out.is_in());
        assert_eq!(ep_out.number(), 2);
    }

    #[test]
    fn identity_wildcard_matching() {
        let any_subclass = ClassIdentity::class(0x08);
        assert!(any_subclass.matches(0x08, 0x06, 0x50));
        assert!(any_subclass.matches(0x08, 0x00, 0x00));
        assert!(!any_subclass.matches(0x01, 0x06, 0x50));

        let pinned = ClassIdentity::subclass(0x01, 0x02);
        assert!(pinned.matches(0x01, 0x02, 0x00));
        assert!(pinned.matches(0x01, 0x02, 0x20));
        assert!(!pinned.matches(0x01, 0x03, 0x00));

        let full = ClassIdentity::protocol(0x01, 0x02, 0x20);
        assert!(full.matches(0x01, 0x02, 0x20));
        assert!(!full.matches(0x01, 0x02, 0x00));
    }

    #[test]
    fn constructors_fill_expected_fields() {
        let eps = [EndpointAddress::ep_in(1), EndpointAddress::ep_out(1)];

        let cmd = ClassCommand::query(1, 2, 3);
        assert_eq!(cmd.request, Some(ClassRequest::Query));
        assert_eq!(
            (cmd.class_code, cmd.subclass_code, cmd.protocol_code),
            (1, 2, 3)
        );

        let cmd = ClassCommand::change(1, &eps);
        assert_eq!(cmd.request, Some(ClassRequest::Change));
        assert_eq!(cmd.alternate_setting, 1);
        assert_eq!(cmd.endpoints.len(), 2);

        let mut xfer = ControlTransfer::new(SetupPacket {
            request_type: 0xA1,
            request: 0x01,
            value: 0x0100,
            index: 0,
            length: 2,
        });
        let cmd = ClassCommand::request(&mut xfer);
        assert_eq!(cmd.request, Some(ClassRequest::Request));
        assert!(cmd.transfer.is_some());
    }
}
