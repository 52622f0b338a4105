mod multichain;
mod support;
