//! MRIM command codes and status constants.

pub const MRIM_CS_HELLO: u32 = 0x1001;
pub const MRIM_CS_HELLO_ACK: u32 = 0x1002;
pub const MRIM_CS_LOGIN_ACK: u32 = 0x1004;
pub const MRIM_CS_LOGIN_REJ: u32 = 0x1005;
pub const MRIM_CS_PING: u32 = 0x1006;
pub const MRIM_CS_MESSAGE: u32 = 0x1008;
pub const MRIM_CS_MESSAGE_ACK: u32 = 0x1009;
pub const MRIM_CS_USER_STATUS: u32 = 0x100F;
pub const MRIM_CS_MESSAGE_RECV: u32 = 0x1011;
pub const MRIM_CS_MESSAGE_STATUS: u32 = 0x1012;
pub const MRIM_CS_LOGOUT: u32 = 0x1013;
pub const MRIM_CS_ADD_CONTACT: u32 = 0x1019;
pub const MRIM_CS_ADD_CONTACT_ACK: u32 = 0x101A;
pub const MRIM_CS_AUTHORIZE_ACK: u32 = 0x1021;
pub const MRIM_CS_CHANGE_STATUS: u32 = 0x1022;
pub const MRIM_CS_ANKETA_INFO: u32 = 0x1028;
pub const MRIM_CS_WP_REQUEST: u32 = 0x1029;
pub const MRIM_CS_MAILBOX_STATUS: u32 = 0x1033;
pub const MRIM_CS_CONTACT_LIST2: u32 = 0x1037;
pub const MRIM_CS_LOGIN2: u32 = 0x1038;

/// Human-readable command name for logs.
pub fn command_name(code: u32) -> &'static str {
    match code {
        MRIM_CS_HELLO => "HELLO",
        MRIM_CS_HELLO_ACK => "HELLO_ACK",
        MRIM_CS_LOGIN_ACK => "LOGIN_ACK",
        MRIM_CS_LOGIN_REJ => "LOGIN_REJ",
        MRIM_CS_PING => "PING",
        MRIM_CS_MESSAGE => "MESSAGE",
        MRIM_CS_MESSAGE_ACK => "MESSAGE_ACK",
        MRIM_CS_USER_STATUS => "USER_STATUS",
        MRIM_CS_MESSAGE_RECV => "MESSAGE_RECV",
        MRIM_CS_MESSAGE_STATUS => "MESSAGE_STATUS",
        MRIM_CS_LOGOUT => "LOGOUT",
        MRIM_CS_ADD_CONTACT => "ADD_CONTACT",
        MRIM_CS_ADD_CONTACT_ACK => "ADD_CONTACT_ACK",
        MRIM_CS_AUTHORIZE_ACK => "AUTHORIZE_ACK",
        MRIM_CS_CHANGE_STATUS => "CHANGE_STATUS",
        MRIM_CS_ANKETA_INFO => "ANKETA_INFO",
        MRIM_CS_WP_REQUEST => "WP_REQUEST",
        MRIM_CS_MAILBOX_STATUS => "MAILBOX_STATUS",
        MRIM_CS_CONTACT_LIST2 => "CONTACT_LIST2",
        MRIM_CS_LOGIN2 => "LOGIN2",
        _ => "UNKNOWN",
    }
}

/// Presence status values.
pub mod status {
    pub const STATUS_OFFLINE: u32 = 0x0000_0000;
    pub const STATUS_ONLINE: u32 = 0x0000_0001;
    pub const STATUS_AWAY: u32 = 0x0000_0002;
    pub const STATUS_UNDETERMINATED: u32 = 0x0000_0003;
    pub const STATUS_FLAG_INVISIBLE: u32 = 0x8000_0000;
}

/// MESSAGE_STATUS codes.
pub mod message_status {
    pub const MESSAGE_DELIVERED: u32 = 0x0000;
    pub const MESSAGE_REJECTED_NOUSER: u32 = 0x8001;
    pub const MESSAGE_REJECTED_INTERR: u32 = 0x8003;
    pub const MESSAGE_REJECTED_LIMIT_EXCEEDED: u32 = 0x8004;
    pub const MESSAGE_REJECTED_TOO_LARGE: u32 = 0x8005;
    pub const MESSAGE_REJECTED_DENY_OFFMSG: u32 = 0x8006;
}

/// MESSAGE flags.
pub mod message_flags {
    pub const MESSAGE_FLAG_OFFLINE: u32 = 0x0000_0001;
    pub const MESSAGE_FLAG_NORECV: u32 = 0x0000_0004;
    pub const MESSAGE_FLAG_AUTHORIZE: u32 = 0x0000_0008;
    pub const MESSAGE_FLAG_SYSTEM: u32 = 0x0000_0040;
    pub const MESSAGE_FLAG_RTF: u32 = 0x0000_0080;
    pub const MESSAGE_FLAG_NOTIFY: u32 = 0x0000_0400;
}

/// ANKETA_INFO status codes.
pub mod anketa_status {
    pub const MRIM_ANKETA_INFO_STATUS_NOUSER: u32 = 0;
    pub const MRIM_ANKETA_INFO_STATUS_OK: u32 = 1;
    pub const MRIM_ANKETA_INFO_STATUS_DBERR: u32 = 2;
    pub const MRIM_ANKETA_INFO_STATUS_RATELIMERR: u32 = 3;
}

/// ADD_CONTACT_ACK status codes and ADD_CONTACT flags.
pub mod contact_oper {
    pub const CONTACT_OPER_SUCCESS: u32 = 0x0000;
    pub const CONTACT_OPER_ERROR: u32 = 0x0001;
    pub const CONTACT_OPER_INTERR: u32 = 0x0002;
    pub const CONTACT_OPER_NO_SUCH_USER: u32 = 0x0003;
    pub const CONTACT_OPER_INVALID_INFO: u32 = 0x0004;
    pub const CONTACT_OPER_USER_EXISTS: u32 = 0x0005;
    pub const CONTACT_OPER_GROUP_LIMIT: u32 = 0x0006;

    pub const CONTACT_FLAG_GROUP: u32 = 0x0000_0002;
}

/// CONTACT_LIST2 status codes.
pub mod contact_list {
    pub const GET_CONTACTS_OK: u32 = 0x0000;
    pub const GET_CONTACTS_ERROR: u32 = 0x0001;
    pub const GET_CONTACTS_INTERR: u32 = 0x0002;
}

/// LOGOUT reasons.
pub mod logout {
    pub const LOGOUT_NO_RELOGIN_FLAG: u32 = 0x0010;
}

/// WP_REQUEST search keys.
pub mod wp_request {
    pub const MRIM_CS_WP_REQUEST_PARAM_USER: u32 = 0;
    pub const MRIM_CS_WP_REQUEST_PARAM_DOMAIN: u32 = 1;
    pub const MRIM_CS_WP_REQUEST_PARAM_NICKNAME: u32 = 2;
    pub const MRIM_CS_WP_REQUEST_PARAM_FIRSTNAME: u32 = 3;
    pub const MRIM_CS_WP_REQUEST_PARAM_LASTNAME: u32 = 4;
    pub const MRIM_CS_WP_REQUEST_PARAM_SEX: u32 = 5;
    pub const MRIM_CS_WP_REQUEST_PARAM_DATE1: u32 = 7;
    pub const MRIM_CS_WP_REQUEST_PARAM_DATE2: u32 = 8;
    pub const MRIM_CS_WP_REQUEST_PARAM_ONLINE: u32 = 9;
    pub const MRIM_CS_WP_REQUEST_PARAM_CITY_ID: u32 = 11;
    pub const MRIM_CS_WP_REQUEST_PARAM_ZODIAC: u32 = 12;
    pub const MRIM_CS_WP_REQUEST_PARAM_BIRTHDAY_MONTH: u32 = 13;
    pub const MRIM_CS_WP_REQUEST_PARAM_BIRTHDAY_DAY: u32 = 14;
    pub const MRIM_CS_WP_REQUEST_PARAM_COUNTRY_ID: u32 = 15;
}
