mod driver;

pub(crate) use driver::{Command, Driver, Link, connect};
