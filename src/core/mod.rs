//! # Core Wire Components
//!
//! Low-level byte handling shared by the MRIM and SOCKS5 sides.
//!
//! ## Components
//! - **Binary**: bounded cursor reads/writes of fixed-width integers in either byte order
//! - **Charset**: Windows-1251 and UTF-16LE transcoding
//! - **Schema**: declarative field tables compiled into encode/decode
//! - **Packet**: the 44-byte MRIM container header and its payload
//! - **Codec**: Tokio codec framing MRIM packets over a byte stream
//!
//! ## Wire Format
//! ```text
//! [Magic(4)] [Version(4)] [Seq(4)] [Command(4)] [Length(4)] [From(8)] [Reserved(16)] [Payload(N)]
//! ```
//!
//! ## Security
//! - Every read is bounds-checked; short input is `OutOfRange`, never a panic
//! - Declared payload lengths are checked before slicing and capped before buffering

pub mod binary;
pub mod charset;
pub mod codec;
pub mod packet;
pub mod schema;
