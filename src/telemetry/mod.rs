/// 车辆遥测 (Vehicle telemetry)
/// - SpeedGauge:  共享车速 (km/h), 轮询线程写, 判定器读
/// - SpeedPoller: 轮询手机传感器接口 `sensors.json`
pub mod speed;

pub use speed::{parse_gps_speed, SpeedGauge, SpeedPoller};
