use std::sync::Once;

use chrono::{Duration, Local, NaiveTime, TimeZone};
use influxdb_helper_rs::{InfluxClient, util::default_time_offset};
use rand::random_range;

static INIT: Once = Once::new();

fn setup() {
    INIT.call_once(|| {
        simple_logger::init_with_level(log::Level::Info).unwrap();
        dotenvy::dotenv().unwrap();
    });
}

/// 写入今天 08:00 开始的 60 分钟数据：速度先上升再下降
#[tokio::main]
async fn main() {
    setup();
    let client = InfluxClient::from_env().unwrap();

    let tz = default_time_offset();
    let today = Local::now().with_timezone(&tz).date_naive();
    let mut ts = tz.from_local_datetime(&today.and_time(NaiveTime::from_hms_opt(8, 0, 0).unwrap())).unwrap();

    let mut speed = 20.33;
    let session = client.session();

    let session = (0..60).fold(session, |session, i| {
        let temp: f64 = random_range(-10.0f64..40.0f64);

        let session = session.write(
            "test_data",
            [("imei", "123123"), ("iccid", "234234")],
            [("speed", speed), ("temp", temp)],
            ts,
        );

        ts += Duration::minutes(1);
        speed += if i < 30 { 1.0 } else { -1.0 };

        session
    });

    session.flush().await;

    for e in session.write_errors() {
        log::error!("{}", e);
    }

    log::info!("done");
}
