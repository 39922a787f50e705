//! MRIM command payloads.
//!
//! Fixed-layout payloads are a schema plus a typed struct ([`WireMessage`]). The two
//! variable-shape payloads, CONTACT_LIST2 and ANKETA_INFO, are assembled from per-record
//! schemas, and WP_REQUEST is a run of key/value pairs parsed until the payload ends.

use bytes::Bytes;

use crate::core::binary::{BinaryReader, BinaryWriter, Endianness};
use crate::core::charset;
use crate::core::schema::{Field, Fields, Schema};
use crate::error::{ProtocolError, Result};
use crate::protocol::commands::*;
use crate::store::{Contact, ContactGroup, SearchQuery, UserProfile};

/// A payload with a single static layout.
pub trait WireMessage: Sized {
    const COMMAND: u32;
    const SCHEMA: Schema;

    fn to_fields(&self) -> Fields;
    fn from_fields(fields: &Fields) -> Result<Self>;

    fn encode(&self) -> Result<Bytes> {
        Self::SCHEMA.encode(&self.to_fields())
    }

    fn decode(payload: &[u8]) -> Result<Self> {
        Self::from_fields(&Self::SCHEMA.decode(payload)?)
    }
}

const LE: Endianness = Endianness::Little;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HelloAck {
    pub ping_period: u32,
}

impl WireMessage for HelloAck {
    const COMMAND: u32 = MRIM_CS_HELLO_ACK;
    const SCHEMA: Schema = Schema::new("hello_ack", LE, &[Field::uint32("ping_period")]);

    fn to_fields(&self) -> Fields {
        Fields::new().with("ping_period", self.ping_period)
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            ping_period: fields.u32("ping_period")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login2 {
    pub login: String,
    pub password: String,
    pub status: u32,
    pub user_agent: String,
}

impl WireMessage for Login2 {
    const COMMAND: u32 = MRIM_CS_LOGIN2;
    const SCHEMA: Schema = Schema::new(
        "login2",
        LE,
        &[
            Field::charset_string("login"),
            Field::charset_string("password"),
            Field::uint32("status"),
            Field::charset_string("user_agent"),
        ],
    );

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with("login", self.login.as_str())
            .with("password", self.password.as_str())
            .with("status", self.status)
            .with("user_agent", self.user_agent.as_str())
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            login: fields.text("login")?.to_string(),
            password: fields.text("password")?.to_string(),
            status: fields.u32("status")?,
            user_agent: fields.text("user_agent")?.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRej {
    pub reason: String,
}

impl WireMessage for LoginRej {
    const COMMAND: u32 = MRIM_CS_LOGIN_REJ;
    const SCHEMA: Schema = Schema::new("login_rej", LE, &[Field::charset_string("reason")]);

    fn to_fields(&self) -> Fields {
        Fields::new().with("reason", self.reason.as_str())
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            reason: fields.text("reason")?.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxStatus {
    pub unread: u32,
}

impl WireMessage for MailboxStatus {
    const COMMAND: u32 = MRIM_CS_MAILBOX_STATUS;
    const SCHEMA: Schema = Schema::new("mailbox_status", LE, &[Field::uint32("unread")]);

    fn to_fields(&self) -> Fields {
        Fields::new().with("unread", self.unread)
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            unread: fields.u32("unread")?,
        })
    }
}

/// Client to server instant message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub flags: u32,
    pub to: String,
    pub text: String,
    pub rtf: Bytes,
}

impl WireMessage for Message {
    const COMMAND: u32 = MRIM_CS_MESSAGE;
    const SCHEMA: Schema = Schema::new(
        "message",
        LE,
        &[
            Field::uint32("flags"),
            Field::charset_string("to"),
            Field::unicode_string("text"),
            Field::byte_array("rtf"),
        ],
    );

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with("flags", self.flags)
            .with("to", self.to.as_str())
            .with("text", self.text.as_str())
            .with("rtf", self.rtf.clone())
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            flags: fields.u32("flags")?,
            to: fields.text("to")?.to_string(),
            text: fields.text("text")?.to_string(),
            rtf: fields.bytes("rtf")?.clone(),
        })
    }
}

/// Server to recipient delivery of a relayed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAck {
    pub msg_id: u32,
    pub flags: u32,
    pub from: String,
    pub text: String,
    pub rtf: Bytes,
}

impl WireMessage for MessageAck {
    const COMMAND: u32 = MRIM_CS_MESSAGE_ACK;
    const SCHEMA: Schema = Schema::new(
        "message_ack",
        LE,
        &[
            Field::uint32("msg_id"),
            Field::uint32("flags"),
            Field::charset_string("from"),
            Field::unicode_string("text"),
            Field::byte_array("rtf"),
        ],
    );

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with("msg_id", self.msg_id)
            .with("flags", self.flags)
            .with("from", self.from.as_str())
            .with("text", self.text.as_str())
            .with("rtf", self.rtf.clone())
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            msg_id: fields.u32("msg_id")?,
            flags: fields.u32("flags")?,
            from: fields.text("from")?.to_string(),
            text: fields.text("text")?.to_string(),
            rtf: fields.bytes("rtf")?.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageStatus {
    pub status: u32,
}

impl WireMessage for MessageStatus {
    const COMMAND: u32 = MRIM_CS_MESSAGE_STATUS;
    const SCHEMA: Schema = Schema::new("message_status", LE, &[Field::uint32("status")]);

    fn to_fields(&self) -> Fields {
        Fields::new().with("status", self.status)
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            status: fields.u32("status")?,
        })
    }
}

/// Presence push for one contact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStatus {
    pub status: u32,
    pub user: String,
}

impl WireMessage for UserStatus {
    const COMMAND: u32 = MRIM_CS_USER_STATUS;
    const SCHEMA: Schema = Schema::new(
        "user_status",
        LE,
        &[Field::uint32("status"), Field::charset_string("user")],
    );

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with("status", self.status)
            .with("user", self.user.as_str())
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            status: fields.u32("status")?,
            user: fields.text("user")?.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeStatus {
    pub status: u32,
}

impl WireMessage for ChangeStatus {
    const COMMAND: u32 = MRIM_CS_CHANGE_STATUS;
    const SCHEMA: Schema = Schema::new("change_status", LE, &[Field::uint32("status")]);

    fn to_fields(&self) -> Fields {
        Fields::new().with("status", self.status)
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            status: fields.u32("status")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Logout {
    pub reason: u32,
}

impl WireMessage for Logout {
    const COMMAND: u32 = MRIM_CS_LOGOUT;
    const SCHEMA: Schema = Schema::new("logout", LE, &[Field::uint32("reason")]);

    fn to_fields(&self) -> Fields {
        Fields::new().with("reason", self.reason)
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            reason: fields.u32("reason")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddContact {
    pub flags: u32,
    pub group_id: u32,
    pub email: String,
    pub name: String,
    pub unused: String,
}

impl WireMessage for AddContact {
    const COMMAND: u32 = MRIM_CS_ADD_CONTACT;
    const SCHEMA: Schema = Schema::new(
        "add_contact",
        LE,
        &[
            Field::uint32("flags"),
            Field::uint32("group_id"),
            Field::charset_string("email"),
            Field::charset_string("name"),
            Field::charset_string("unused"),
        ],
    );

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with("flags", self.flags)
            .with("group_id", self.group_id)
            .with("email", self.email.as_str())
            .with("name", self.name.as_str())
            .with("unused", self.unused.as_str())
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            flags: fields.u32("flags")?,
            group_id: fields.u32("group_id")?,
            email: fields.text("email")?.to_string(),
            name: fields.text("name")?.to_string(),
            unused: fields.text("unused")?.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddContactAck {
    pub status: u32,
    pub contact_id: u32,
}

impl WireMessage for AddContactAck {
    const COMMAND: u32 = MRIM_CS_ADD_CONTACT_ACK;
    const SCHEMA: Schema = Schema::new(
        "add_contact_ack",
        LE,
        &[Field::uint32("status"), Field::uint32("contact_id")],
    );

    fn to_fields(&self) -> Fields {
        Fields::new()
            .with("status", self.status)
            .with("contact_id", self.contact_id)
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            status: fields.u32("status")?,
            contact_id: fields.u32("contact_id")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizeAck {
    pub user: String,
}

impl WireMessage for AuthorizeAck {
    const COMMAND: u32 = MRIM_CS_AUTHORIZE_ACK;
    const SCHEMA: Schema = Schema::new("authorize_ack", LE, &[Field::charset_string("user")]);

    fn to_fields(&self) -> Fields {
        Fields::new().with("user", self.user.as_str())
    }

    fn from_fields(fields: &Fields) -> Result<Self> {
        Ok(Self {
            user: fields.text("user")?.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// CONTACT_LIST2
// ---------------------------------------------------------------------------

/// Column layout letters understood by clients: `u` = u32, `s` = length-prefixed string.
pub const GROUP_MASK: &str = "us";
pub const CONTACT_MASK: &str = "uussuus";

const CONTACT_LIST_HEAD: Schema = Schema::new(
    "contact_list2",
    LE,
    &[
        Field::uint32("status"),
        Field::uint32("groups_number"),
        Field::charset_string("groups_mask"),
        Field::charset_string("contacts_mask"),
    ],
);

const GROUP_ENTRY: Schema = Schema::new(
    "contact_group",
    LE,
    &[Field::uint32("flags"), Field::charset_string("name")],
);

const CONTACT_ENTRY: Schema = Schema::new(
    "contact",
    LE,
    &[
        Field::uint32("flags"),
        Field::uint32("group_id"),
        Field::charset_string("email"),
        Field::charset_string("nickname"),
        Field::uint32("server_flags"),
        Field::uint32("status"),
        Field::charset_string("phone"),
    ],
);

/// One contact row as sent to the client, with live presence filled in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactEntry {
    pub flags: u32,
    pub group_id: u32,
    pub email: String,
    pub nickname: String,
    pub server_flags: u32,
    pub status: u32,
    pub phone: String,
}

impl ContactEntry {
    pub fn from_contact(contact: &Contact, status: u32) -> Self {
        Self {
            flags: contact.flags,
            group_id: contact.group_id,
            email: contact.login.clone(),
            nickname: contact.nickname.clone(),
            server_flags: contact.server_flags,
            status,
            phone: contact.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactList2 {
    pub status: u32,
    pub groups: Vec<ContactGroup>,
    pub contacts: Vec<ContactEntry>,
}

impl ContactList2 {
    pub const COMMAND: u32 = MRIM_CS_CONTACT_LIST2;

    pub fn encode(&self) -> Result<Bytes> {
        let mut writer = BinaryWriter::little();
        CONTACT_LIST_HEAD.encode_into(
            &Fields::new()
                .with("status", self.status)
                .with("groups_number", self.groups.len() as u32)
                .with("groups_mask", GROUP_MASK)
                .with("contacts_mask", CONTACT_MASK),
            &mut writer,
        )?;
        for group in &self.groups {
            GROUP_ENTRY.encode_into(
                &Fields::new()
                    .with("flags", group.flags)
                    .with("name", group.name.as_str()),
                &mut writer,
            )?;
        }
        for contact in &self.contacts {
            CONTACT_ENTRY.encode_into(
                &Fields::new()
                    .with("flags", contact.flags)
                    .with("group_id", contact.group_id)
                    .with("email", contact.email.as_str())
                    .with("nickname", contact.nickname.as_str())
                    .with("server_flags", contact.server_flags)
                    .with("status", contact.status)
                    .with("phone", contact.phone.as_str()),
                &mut writer,
            )?;
        }
        Ok(writer.into_bytes())
    }

    /// Parse a list produced with [`GROUP_MASK`] / [`CONTACT_MASK`].
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::little(payload);
        let head = CONTACT_LIST_HEAD.decode_from(&mut reader)?;
        if head.text("groups_mask")? != GROUP_MASK || head.text("contacts_mask")? != CONTACT_MASK
        {
            return Err(ProtocolError::Violation(
                "unsupported contact list mask".into(),
            ));
        }

        let groups_number = head.u32("groups_number")? as usize;
        let mut groups = Vec::with_capacity(groups_number.min(256));
        for id in 0..groups_number {
            let g = GROUP_ENTRY.decode_from(&mut reader)?;
            groups.push(ContactGroup {
                id: id as u32,
                flags: g.u32("flags")?,
                name: g.text("name")?.to_string(),
            });
        }

        let mut contacts = Vec::new();
        while !reader.is_empty() {
            let c = CONTACT_ENTRY.decode_from(&mut reader)?;
            contacts.push(ContactEntry {
                flags: c.u32("flags")?,
                group_id: c.u32("group_id")?,
                email: c.text("email")?.to_string(),
                nickname: c.text("nickname")?.to_string(),
                server_flags: c.u32("server_flags")?,
                status: c.u32("status")?,
                phone: c.text("phone")?.to_string(),
            });
        }

        Ok(Self {
            status: head.u32("status")?,
            groups,
            contacts,
        })
    }
}

// ---------------------------------------------------------------------------
// WP_REQUEST / ANKETA_INFO
// ---------------------------------------------------------------------------

/// Parse the repeated `(key u32, value lps)` pairs of a WP_REQUEST.
///
/// Unknown keys and unparsable numbers are skipped; a truncated pair is an error.
pub fn parse_wp_request(payload: &[u8]) -> Result<SearchQuery> {
    use wp_request::*;

    let mut reader = BinaryReader::little(payload);
    let mut query = SearchQuery::default();

    while !reader.is_empty() {
        let key = reader.read_u32()?;
        let value = charset::decode_legacy(reader.read_lps()?);
        let number = || value.trim().parse::<u32>().ok();
        match key {
            MRIM_CS_WP_REQUEST_PARAM_USER => query.user = Some(value.clone()),
            MRIM_CS_WP_REQUEST_PARAM_DOMAIN => query.domain = Some(value.clone()),
            MRIM_CS_WP_REQUEST_PARAM_NICKNAME => query.nickname = Some(value.clone()),
            MRIM_CS_WP_REQUEST_PARAM_FIRSTNAME => query.first_name = Some(value.clone()),
            MRIM_CS_WP_REQUEST_PARAM_LASTNAME => query.last_name = Some(value.clone()),
            MRIM_CS_WP_REQUEST_PARAM_SEX => query.sex = number(),
            MRIM_CS_WP_REQUEST_PARAM_DATE1 => query.min_age = number(),
            MRIM_CS_WP_REQUEST_PARAM_DATE2 => query.max_age = number(),
            MRIM_CS_WP_REQUEST_PARAM_ONLINE => query.online_only = number() == Some(1),
            MRIM_CS_WP_REQUEST_PARAM_CITY_ID => query.city_id = number(),
            MRIM_CS_WP_REQUEST_PARAM_ZODIAC => query.zodiac = number(),
            MRIM_CS_WP_REQUEST_PARAM_BIRTHDAY_MONTH => query.birth_month = number(),
            MRIM_CS_WP_REQUEST_PARAM_BIRTHDAY_DAY => query.birth_day = number(),
            MRIM_CS_WP_REQUEST_PARAM_COUNTRY_ID => query.country_id = number(),
            _ => {}
        }
    }

    Ok(query)
}

/// Build a WP_REQUEST payload; the counterpart of [`parse_wp_request`].
pub fn encode_wp_request(params: &[(u32, &str)]) -> Result<Bytes> {
    let mut writer = BinaryWriter::little();
    for (key, value) in params {
        writer.write_u32(*key);
        writer.write_lps(&charset::encode_legacy(value))?;
    }
    Ok(writer.into_bytes())
}

/// Column names of a search result row, in wire order.
pub const ANKETA_FIELDS: [&str; 15] = [
    "Username",
    "Domain",
    "Nickname",
    "FirstName",
    "LastName",
    "Sex",
    "Birthday",
    "City_id",
    "Location",
    "Zodiac",
    "BMonth",
    "BDay",
    "Country_id",
    "Phone",
    "mrim_status",
];

const ANKETA_HEAD: Schema = Schema::new(
    "anketa_info",
    LE,
    &[
        Field::uint32("status"),
        Field::uint32("fields_num"),
        Field::uint32("max_rows"),
        Field::uint32("server_time"),
    ],
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnketaInfo {
    pub status: u32,
    pub max_rows: u32,
    pub server_time: u32,
    pub rows: Vec<Vec<String>>,
}

impl AnketaInfo {
    pub const COMMAND: u32 = MRIM_CS_ANKETA_INFO;

    /// A reply that carries only a status (no columns, no rows).
    pub fn status_only(status: u32, server_time: u32) -> Self {
        Self {
            status,
            max_rows: 0,
            server_time,
            rows: Vec::new(),
        }
    }

    pub fn from_profiles(profiles: &[UserProfile], max_rows: u32, server_time: u32) -> Self {
        Self {
            status: anketa_status::MRIM_ANKETA_INFO_STATUS_OK,
            max_rows,
            server_time,
            rows: profiles.iter().map(profile_row).collect(),
        }
    }

    pub fn encode(&self) -> Result<Bytes> {
        let columns: &[&str] = if self.status == anketa_status::MRIM_ANKETA_INFO_STATUS_OK {
            &ANKETA_FIELDS
        } else {
            &[]
        };

        let mut writer = BinaryWriter::little();
        ANKETA_HEAD.encode_into(
            &Fields::new()
                .with("status", self.status)
                .with("fields_num", columns.len() as u32)
                .with("max_rows", self.max_rows)
                .with("server_time", self.server_time),
            &mut writer,
        )?;
        for name in columns {
            writer.write_lps(&charset::encode_legacy(name))?;
        }
        for row in &self.rows {
            if row.len() != columns.len() {
                return Err(ProtocolError::Internal(format!(
                    "search row has {} values for {} columns",
                    row.len(),
                    columns.len()
                )));
            }
            for value in row {
                writer.write_lps(&charset::encode_legacy(value))?;
            }
        }
        Ok(writer.into_bytes())
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::little(payload);
        let head = ANKETA_HEAD.decode_from(&mut reader)?;
        let fields_num = head.u32("fields_num")? as usize;

        for _ in 0..fields_num {
            reader.read_lps()?;
        }

        let mut rows = Vec::new();
        while fields_num > 0 && !reader.is_empty() {
            let mut row = Vec::with_capacity(fields_num);
            for _ in 0..fields_num {
                row.push(charset::decode_legacy(reader.read_lps()?));
            }
            rows.push(row);
        }

        Ok(Self {
            status: head.u32("status")?,
            max_rows: head.u32("max_rows")?,
            server_time: head.u32("server_time")?,
            rows,
        })
    }
}

fn profile_row(profile: &UserProfile) -> Vec<String> {
    let (user, domain) = profile
        .login
        .split_once('@')
        .unwrap_or((profile.login.as_str(), ""));
    vec![
        user.to_string(),
        domain.to_string(),
        profile.nickname.clone(),
        profile.first_name.clone(),
        profile.last_name.clone(),
        profile.sex.to_string(),
        profile.birthday.clone(),
        profile.city_id.to_string(),
        profile.location.clone(),
        profile.zodiac.to_string(),
        profile.birth_month.to_string(),
        profile.birth_day.to_string(),
        profile.country_id.to_string(),
        profile.phone.clone(),
        profile.status.to_string(),
    ]
}
