// Receive side: radio and camera input.
// Raw bytes come off the radio, get decoded into records and handed to the router.
// The camera runs on its own thread, independent of the radio.

pub mod camera;
pub mod decoder;
pub mod packet;
pub mod radio;
pub mod radio_reader;
pub mod simulated;
