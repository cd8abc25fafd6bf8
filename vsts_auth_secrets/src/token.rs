use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// The longest token value accepted, measured in UTF-16 code units
///
/// Matches the limit enforced by the platform's credential storage.
pub const MAX_TOKEN_LENGTH: usize = 2047;

/// An error constructing or decoding a [`Token`]
#[derive(Debug, Error)]
pub enum InvalidToken {
    /// The token value exceeds [`MAX_TOKEN_LENGTH`]
    #[error("token value is {0} code units, exceeding the limit of {MAX_TOKEN_LENGTH}")]
    TooLong(usize),
    /// The serialized token bytes are not valid UTF-8
    #[error("token bytes are not valid UTF-8")]
    NotUtf8(#[from] std::str::Utf8Error),
}

/// The kind of a [`Token`]
///
/// The discriminants match the ordinals used by the legacy binary encoding,
/// so they must not be reordered.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TokenKind {
    /// A token of unknown provenance
    Unknown = 0,
    /// A personal access token issued by the platform
    Personal = 1,
    /// An Azure Directory access token
    Access = 2,
    /// An Azure Directory refresh token
    Refresh = 3,
    /// A federated authentication (Team Services session) token
    Federated = 4,
    /// A token used only by tests
    Test = 5,
}

impl TokenKind {
    /// The ordinal used by the binary token encoding
    #[inline]
    pub fn ordinal(self) -> u32 {
        self as u32
    }

    /// Looks a kind up by its binary-encoding ordinal
    pub fn from_ordinal(ordinal: u32) -> Option<Self> {
        match ordinal {
            0 => Some(Self::Unknown),
            1 => Some(Self::Personal),
            2 => Some(Self::Access),
            3 => Some(Self::Refresh),
            4 => Some(Self::Federated),
            5 => Some(Self::Test),
            _ => None,
        }
    }

    /// The name used by the XML store's `<Type>` element
    pub fn name(self) -> &'static str {
        match self {
            Self::Unknown => "Unknown",
            Self::Personal => "Personal",
            Self::Access => "Access",
            Self::Refresh => "Refresh",
            Self::Federated => "Federated",
            Self::Test => "Test",
        }
    }

    /// Looks a kind up by its `<Type>` element name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "Unknown" => Some(Self::Unknown),
            "Personal" => Some(Self::Personal),
            "Access" => Some(Self::Access),
            "Refresh" => Some(Self::Refresh),
            "Federated" => Some(Self::Federated),
            "Test" => Some(Self::Test),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A bearer token
///
/// Carries the opaque token value, the kind of token, and the identity of
/// the account the token is bound to. The target identity is the nil UUID
/// until the token is bound to a specific account.
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    value: String,
    kind: TokenKind,
    target_identity: Uuid,
}

impl Token {
    /// Constructs a new token, unbound to any account
    ///
    /// Fails when the value is longer than [`MAX_TOKEN_LENGTH`] UTF-16 code
    /// units.
    pub fn new(value: impl Into<String>, kind: TokenKind) -> Result<Self, InvalidToken> {
        let value = value.into();
        let code_units = value.encode_utf16().count();
        if code_units > MAX_TOKEN_LENGTH {
            return Err(InvalidToken::TooLong(code_units));
        }
        Ok(Self {
            value,
            kind,
            target_identity: Uuid::nil(),
        })
    }

    /// The opaque token value
    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// The kind of this token
    #[inline]
    pub fn kind(&self) -> TokenKind {
        self.kind
    }

    /// The identity of the account this token is bound to
    ///
    /// The nil UUID when the token is not bound to any account.
    #[inline]
    pub fn target_identity(&self) -> Uuid {
        self.target_identity
    }

    /// Binds this token to an account identity
    pub fn set_target_identity(&mut self, target_identity: Uuid) {
        self.target_identity = target_identity;
    }

    /// True when the token value is non-empty
    #[inline]
    pub fn has_value(&self) -> bool {
        !self.value.is_empty()
    }

    /// The `Authorization` header value for this token
    pub fn authorization_header(&self) -> String {
        format!("Bearer {}", self.value)
    }

    /// Encodes the token in the binary form used by legacy secret stores
    ///
    /// Layout: little-endian `u32` kind ordinal, the 16-byte mixed-endian
    /// GUID form of the target identity, then the UTF-8 token value.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(20 + self.value.len());
        bytes.extend_from_slice(&self.kind.ordinal().to_le_bytes());
        bytes.extend_from_slice(&self.target_identity.to_bytes_le());
        bytes.extend_from_slice(self.value.as_bytes());
        bytes
    }

    /// Decodes a token from its stored binary form
    ///
    /// Buffers long enough to carry the kind ordinal and target identity
    /// header are decoded as the current format. Anything else is treated as
    /// the old format: a bare UTF-8 value of kind `kind`, bound to no
    /// account.
    pub fn from_bytes(bytes: &[u8], kind: TokenKind) -> Result<Self, InvalidToken> {
        if bytes.len() > 20 {
            let ordinal = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            if let Some(decoded_kind) = TokenKind::from_ordinal(ordinal) {
                let mut guid = [0u8; 16];
                guid.copy_from_slice(&bytes[4..20]);
                let target_identity = Uuid::from_bytes_le(guid);
                let value = std::str::from_utf8(&bytes[20..])?;
                let mut token = Self::new(value, decoded_kind)?;
                token.set_target_identity(target_identity);
                return Ok(token);
            }
        }

        // old format: nothing but the UTF-8 value
        let value = std::str::from_utf8(bytes)?;
        Self::new(value, kind)
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Token")
            .field("value", &"***TOKEN***")
            .field("kind", &self.kind)
            .field("target_identity", &self.target_identity)
            .finish()
    }
}
