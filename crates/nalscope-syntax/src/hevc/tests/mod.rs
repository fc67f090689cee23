mod helpers;
mod sps;
mod vps;
