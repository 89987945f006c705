mod buffers;
pub use buffers::*;

mod ao;
pub use ao::*;

mod ring_loop;
pub use ring_loop::*;
