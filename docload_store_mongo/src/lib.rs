//! [`SessionProvider`](docload_store_core::SessionProvider) backed by the
//! MongoDB driver.

mod convert;
mod provider;
mod session;

pub use self::{
    convert::topology_from_hello,
    provider::MongoProvider,
    session::MongoSession,
};
