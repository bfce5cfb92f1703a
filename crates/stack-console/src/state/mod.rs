mod controller;
mod registry;
mod sequences;

pub(crate) use controller::Controller;
