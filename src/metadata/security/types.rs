use crate::metadata::customattributes::CustomAttributeNamedArgument;

/// Security actions as defined in ECMA-335 and .NET Framework
///
/// These values control how permissions are applied to code elements (methods, types,
/// assemblies), they are stored in `DeclSecurity.Action`.
///
/// # Reference
/// * ECMA-335 II.22.11
/// * <https://learn.microsoft.com/en-us/dotnet/api/system.security.permissions.securityaction>
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SecurityAction {
    /// Refuse Demand for the specified permission
    Deny,
    /// Check that all callers in the call chain have been granted the permission
    Demand,
    /// Satisfy Demand for the specified permission without further checks
    Assert,
    /// Demand for non-CAS permissions
    NonCasDemand,
    /// Check that the immediate caller has been granted the permission
    LinkDemand,
    /// Required to inherit from the class or override the method
    InheritanceDemand,
    /// Minimum permissions required to run
    RequestMinimum,
    /// Optional permissions to grant
    RequestOptional,
    /// Permissions not to be granted
    RequestRefuse,
    /// Reserved, prejit grant set
    PrejitGrant,
    /// Reserved, prejit denied set
    PrejitDeny,
    /// Non-CAS `LinkDemand`
    NonCasLinkDemand,
    /// Non-CAS `InheritanceDemand`
    NonCasInheritance,
    /// `LinkDemand` with a choice of permissions
    LinkDemandChoice,
    /// `InheritanceDemand` with a choice of permissions
    InheritanceDemandChoice,
    /// `Demand` with a choice of permissions
    DemandChoice,
    /// Refuse Demand for everything but the specified permissions
    PermitOnly,
    /// Value outside the defined range
    Unknown(u16),
}

impl From<u16> for SecurityAction {
    fn from(value: u16) -> Self {
        match value {
            0x0001 => SecurityAction::Deny,
            0x0002 => SecurityAction::Demand,
            0x0003 => SecurityAction::Assert,
            0x0004 => SecurityAction::NonCasDemand,
            0x0005 => SecurityAction::LinkDemand,
            0x0006 => SecurityAction::InheritanceDemand,
            0x0007 => SecurityAction::RequestMinimum,
            0x0008 => SecurityAction::RequestOptional,
            0x0009 => SecurityAction::RequestRefuse,
            0x000A => SecurityAction::PrejitGrant,
            0x000B => SecurityAction::PrejitDeny,
            0x000C => SecurityAction::NonCasLinkDemand,
            0x000D => SecurityAction::NonCasInheritance,
            0x000E => SecurityAction::LinkDemandChoice,
            0x000F => SecurityAction::InheritanceDemandChoice,
            0x0010 => SecurityAction::DemandChoice,
            0x0011 => SecurityAction::PermitOnly,
            _ => SecurityAction::Unknown(value),
        }
    }
}

impl From<SecurityAction> for u16 {
    fn from(action: SecurityAction) -> Self {
        match action {
            SecurityAction::Deny => 0x0001,
            SecurityAction::Demand => 0x0002,
            SecurityAction::Assert => 0x0003,
            SecurityAction::NonCasDemand => 0x0004,
            SecurityAction::LinkDemand => 0x0005,
            SecurityAction::InheritanceDemand => 0x0006,
            SecurityAction::RequestMinimum => 0x0007,
            SecurityAction::RequestOptional => 0x0008,
            SecurityAction::RequestRefuse => 0x0009,
            SecurityAction::PrejitGrant => 0x000A,
            SecurityAction::PrejitDeny => 0x000B,
            SecurityAction::NonCasLinkDemand => 0x000C,
            SecurityAction::NonCasInheritance => 0x000D,
            SecurityAction::LinkDemandChoice => 0x000E,
            SecurityAction::InheritanceDemandChoice => 0x000F,
            SecurityAction::DemandChoice => 0x0010,
            SecurityAction::PermitOnly => 0x0011,
            SecurityAction::Unknown(value) => value,
        }
    }
}

/// The `DeclSecurity.PermissionSet` blob.
#[derive(Debug, Clone, PartialEq)]
pub enum PermissionSet {
    /// The binary format introduced with .NET 2.0, starting with `.`
    Attributes(Vec<SecurityAttribute>),
    /// The legacy format, an XML document in UTF-16LE
    Xml(String),
    /// A blob in neither format, kept verbatim
    Raw(Vec<u8>),
}

/// One security attribute of a binary permission set.
#[derive(Debug, Clone, PartialEq)]
pub struct SecurityAttribute {
    /// Assembly qualified name of the attribute type
    pub type_name: String,
    /// Property and field assignments
    pub named_args: SecurityNamedArguments,
}

/// Named arguments of a security attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum SecurityNamedArguments {
    /// Decoded arguments
    Resolved(Vec<CustomAttributeNamedArgument>),
    /// Argument bytes (starting at the argument count) that could not be decoded, usually
    /// because an enum type lives in another assembly
    Raw(Vec<u8>),
}
