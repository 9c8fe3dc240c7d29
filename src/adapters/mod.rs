//! Adapters: concrete implementations of the hexagonal port traits.
//!
//! | Adapter        | Implements         | Connects to                  |
//! |----------------|--------------------|------------------------------|
//! | `mailbox`      | FeaturePort        | Latest-wins producer slot    |
//! | `pwm`          | ActuatorPort       | embedded-hal PWM + GPIO      |
//! | `sim`          | ActuatorPort       | In-memory feeder             |
//! | `host`         | FeaturePort        | Mailbox + any actuator       |
//! |                | ActuatorPort       |                              |
//! | `log_sink`     | EventSink          | `log` facade                 |
//! | `json_sink`    | EventSink          | JSON lines on any writer     |
//! | `config_store` | ConfigPort         | postcard blob / JSON file    |
//! | `time`         | -                  | `std::time::Instant`         |

pub mod config_store;
pub mod host;
pub mod json_sink;
pub mod log_sink;
pub mod mailbox;
pub mod pwm;
pub mod sim;
pub mod time;
