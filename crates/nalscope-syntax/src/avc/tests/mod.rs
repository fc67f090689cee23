mod helpers;
mod poc;
mod slice_header;
