//! Wire protocol
//!
//! Newline-free JSON objects, one per WebSocket frame, tagged by `type`.
//!
//! ```text
//!   server → any       {type:"welcome", clientId}
//!   client → server    {type:"hello", role, siteId?, name?}
//!   operator → server  {type:"watch", siteId} / {type:"unwatch", siteId}
//!   server → operator  {type:"site-offline", siteId}
//!   server → site      {type:"incoming-viewer", operatorId, siteId}
//!   site → server      {type:"offer", to, siteId, sdp}
//!   server → operator  {type:"offer", from, siteId, sdp}
//!   operator → server  {type:"answer", siteId, sdp}
//!   server → site      {type:"answer", from, siteId, sdp}
//!   either ↔ server    {type:"ice", to?, siteId?, candidate}
//!   operator → server  {type:"promote", siteId}
//!   server → site      {type:"promote", operatorId, siteId}
//!   site → server      {type:"attention"}
//!   server → operator  {type:"attention", siteId, at}
//!   client → server    {type:"bye"}
//!   server → client    {type:"error", error}
//! ```

pub mod message;

pub use message::{
    parse_client_message, AnswerRequest, ClientMessage, Hello, IceRequest, OfferRequest,
    ParseError, ServerMessage,
};
