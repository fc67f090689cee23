mod helpers;
mod pps;
mod vps;
