/// フレーム番号を `H:MM:SS.cc` 形式の時刻に変換
///
/// マイクロ秒で丸めてから 1/100 秒未満を切り捨てる。
pub fn format_frame_time(frame: usize, fps: f64) -> String {
    let seconds = if fps > 0.0 { frame as f64 / fps } else { 0.0 };
    format_seconds(seconds)
}

pub fn format_seconds(seconds: f64) -> String {
    let micros = (seconds.max(0.0) * 1_000_000.0).round() as u64;
    let centis = micros / 10_000;
    let hours = centis / 360_000;
    let minutes = centis / 6_000 % 60;
    let secs = centis / 100 % 60;
    let cc = centis % 100;
    format!("{}:{:02}:{:02}.{:02}", hours, minutes, secs, cc)
}
