//! The `insecureStore.xml` document codec
//!
//! ```xml
//! <insecureStore>
//!   <Tokens>
//!     <entry><key>…</key><value><Type>…</Type><Value>…</Value></value></entry>
//!   </Tokens>
//!   <Credentials>
//!     <entry><key>…</key><value><Password>…</Password><Username>…</Username></value></entry>
//!   </Credentials>
//! </insecureStore>
//! ```
//!
//! `<targetIdentity>` follows `<Value>` when the token is bound to an
//! account; the nil identity is omitted. Entries are written in key order so
//! the document is deterministic for a given store state.

use std::collections::BTreeMap;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};
use thiserror::Error;
use uuid::Uuid;

use crate::{Credential, Token, TokenKind};

/// An error reading or writing the XML document
#[derive(Debug, Error)]
pub enum XmlStoreError {
    /// The document is not well-formed XML
    #[error("malformed store document")]
    Xml(#[from] quick_xml::Error),
    /// An entry is structurally incomplete
    #[error("incomplete store entry: missing {0}")]
    IncompleteEntry(&'static str),
    /// A token entry names an unrecognized token type
    #[error("unrecognized token type {0:?}")]
    UnknownTokenType(String),
    /// A token entry holds a value the model rejects
    #[error(transparent)]
    InvalidToken(#[from] crate::InvalidToken),
}

/// The deserialized contents of an `insecureStore.xml` document
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct StoreContents {
    pub tokens: BTreeMap<String, Token>,
    pub credentials: BTreeMap<String, Credential>,
}

const INSECURE_STORE: &str = "insecureStore";
const TOKENS: &str = "Tokens";
const CREDENTIALS: &str = "Credentials";
const ENTRY: &str = "entry";
const KEY: &str = "key";
const VALUE: &str = "value";
const TOKEN_TYPE: &str = "Type";
const TOKEN_VALUE: &str = "Value";
const TARGET_IDENTITY: &str = "targetIdentity";
const PASSWORD: &str = "Password";
const USERNAME: &str = "Username";

pub(crate) fn to_xml(contents: &StoreContents) -> Result<String, XmlStoreError> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), Some("yes"))))?;
    writer.write_event(Event::Start(BytesStart::new(INSECURE_STORE)))?;

    writer.write_event(Event::Start(BytesStart::new(TOKENS)))?;
    for (key, token) in &contents.tokens {
        writer.write_event(Event::Start(BytesStart::new(ENTRY)))?;
        write_text_element(&mut writer, KEY, key)?;
        writer.write_event(Event::Start(BytesStart::new(VALUE)))?;
        write_text_element(&mut writer, TOKEN_TYPE, token.kind().name())?;
        write_text_element(&mut writer, TOKEN_VALUE, token.value())?;
        if !token.target_identity().is_nil() {
            write_text_element(&mut writer, TARGET_IDENTITY, &token.target_identity().to_string())?;
        }
        writer.write_event(Event::End(BytesEnd::new(VALUE)))?;
        writer.write_event(Event::End(BytesEnd::new(ENTRY)))?;
    }
    writer.write_event(Event::End(BytesEnd::new(TOKENS)))?;

    writer.write_event(Event::Start(BytesStart::new(CREDENTIALS)))?;
    for (key, credential) in &contents.credentials {
        writer.write_event(Event::Start(BytesStart::new(ENTRY)))?;
        write_text_element(&mut writer, KEY, key)?;
        writer.write_event(Event::Start(BytesStart::new(VALUE)))?;
        write_text_element(&mut writer, PASSWORD, credential.password())?;
        write_text_element(&mut writer, USERNAME, credential.username())?;
        writer.write_event(Event::End(BytesEnd::new(VALUE)))?;
        writer.write_event(Event::End(BytesEnd::new(ENTRY)))?;
    }
    writer.write_event(Event::End(BytesEnd::new(CREDENTIALS)))?;

    writer.write_event(Event::End(BytesEnd::new(INSECURE_STORE)))?;

    Ok(String::from_utf8(writer.into_inner()).expect("writer emits UTF-8"))
}

fn write_text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    text: &str,
) -> Result<(), XmlStoreError> {
    writer.write_event(Event::Start(BytesStart::new(name)))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

#[derive(Debug, Default)]
struct PendingEntry {
    key: Option<String>,
    token_type: Option<String>,
    token_value: Option<String>,
    target_identity: Option<String>,
    password: Option<String>,
    username: Option<String>,
}

impl PendingEntry {
    fn set(&mut self, field: &'static str, text: String) {
        let slot = match field {
            KEY => &mut self.key,
            TOKEN_TYPE => &mut self.token_type,
            TOKEN_VALUE => &mut self.token_value,
            TARGET_IDENTITY => &mut self.target_identity,
            PASSWORD => &mut self.password,
            USERNAME => &mut self.username,
            _ => return,
        };
        *slot = Some(text);
    }

    fn into_token_entry(self) -> Result<(String, Token), XmlStoreError> {
        let key = self.key.ok_or(XmlStoreError::IncompleteEntry(KEY))?;
        let type_name = self
            .token_type
            .ok_or(XmlStoreError::IncompleteEntry(TOKEN_TYPE))?;
        let kind = TokenKind::from_name(&type_name)
            .ok_or(XmlStoreError::UnknownTokenType(type_name))?;
        let value = self
            .token_value
            .ok_or(XmlStoreError::IncompleteEntry(TOKEN_VALUE))?;

        let mut token = Token::new(value, kind)?;
        if let Some(identity) = self.target_identity {
            if let Ok(identity) = Uuid::parse_str(&identity) {
                token.set_target_identity(identity);
            }
        }
        Ok((key, token))
    }

    fn into_credential_entry(self) -> Result<(String, Credential), XmlStoreError> {
        let key = self.key.ok_or(XmlStoreError::IncompleteEntry(KEY))?;
        let username = self.username.ok_or(XmlStoreError::IncompleteEntry(USERNAME))?;
        let password = self.password.ok_or(XmlStoreError::IncompleteEntry(PASSWORD))?;
        Ok((key, Credential::new(username, password)))
    }
}

fn field_for(name: &[u8]) -> Option<&'static str> {
    match name {
        b"key" => Some(KEY),
        b"Type" => Some(TOKEN_TYPE),
        b"Value" => Some(TOKEN_VALUE),
        b"targetIdentity" => Some(TARGET_IDENTITY),
        b"Password" => Some(PASSWORD),
        b"Username" => Some(USERNAME),
        _ => None,
    }
}

pub(crate) fn from_xml(document: &str) -> Result<StoreContents, XmlStoreError> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    let mut contents = StoreContents::default();
    let mut in_tokens = false;
    let mut in_credentials = false;
    let mut entry = PendingEntry::default();
    let mut current_field: Option<&'static str> = None;

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                match start.name().as_ref() {
                    b"Tokens" => in_tokens = true,
                    b"Credentials" => in_credentials = true,
                    b"entry" => entry = PendingEntry::default(),
                    _ => {}
                }
                current_field = field_for(start.name().as_ref());
                // an empty element yields no text event, so the field
                // starts out empty rather than missing
                if let Some(field) = current_field {
                    entry.set(field, String::new());
                }
            }
            Event::Empty(start) => {
                if let Some(field) = field_for(start.name().as_ref()) {
                    entry.set(field, String::new());
                }
            }
            Event::Text(text) => {
                if let Some(field) = current_field {
                    entry.set(field, text.unescape()?.into_owned());
                }
            }
            Event::End(end) => match end.name().as_ref() {
                b"Tokens" => in_tokens = false,
                b"Credentials" => in_credentials = false,
                b"entry" => {
                    let finished = std::mem::take(&mut entry);
                    if in_tokens {
                        let (key, token) = finished.into_token_entry()?;
                        contents.tokens.insert(key, token);
                    } else if in_credentials {
                        let (key, credential) = finished.into_credential_entry()?;
                        contents.credentials.insert(key, credential);
                    }
                }
                _ => current_field = None,
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(contents)
}
