use chrono::{Local, NaiveTime, TimeZone};
use influxdb_helper_rs::{InfluxResult, InfluxClient, util::default_time_offset};

#[tokio::main]
pub async fn main() -> InfluxResult<()> {
    simple_logger::init_with_level(log::Level::Info).unwrap();
    dotenvy::dotenv().ok();

    let client = InfluxClient::from_env()?;

    let tz = default_time_offset();
    let today = Local::now().with_timezone(&tz).date_naive();
    let start = tz.from_local_datetime(&today.and_time(NaiveTime::MIN)).unwrap();
    let stop = tz.from_local_datetime(&today.and_time(NaiveTime::from_hms_opt(23, 5, 0).unwrap())).unwrap();

    let result = client
        .debug()
        .from_default_bucket()
        .range_time(start, stop)
        .measurement("test_data")
        .tag("imei", ["123123"])
        .field(["speed"])
        .query()
        .timeout_ms(30_000)
        .send()
        .await?;

    for record in result {
        let record = record?;
        println!("field: {:?}, value: {:?}, ts: {:?}", record.field(), record.value(), record.time());
    }

    let tz_start = tz.with_ymd_and_hms(2023, 6, 13, 8, 0, 0).unwrap();
    let tz_stop = tz.with_ymd_and_hms(2023, 6, 13, 8, 20, 0).unwrap();

    client
        .delete_with_name(tz_start, tz_stop, "_measurement=\"test_data\" AND imei=\"123123\"")
        .send()
        .await?;

    Ok(())
}
