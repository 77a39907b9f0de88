const SECONDS_PER_HOUR: i64 = 3600;

/// 丸めの方向。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoundingFlavor {
    Ceil,
    Floor,
}

/// 時間を丸める単位(分)。0の場合は丸めない。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rounding {
    pub increment_minutes: u32,
}

impl Rounding {
    pub fn new(increment_minutes: u32) -> Self {
        Self { increment_minutes }
    }

    /// 秒数を丸めて、時間の100倍の整数で返す。
    ///
    /// 1.25時間は125、0.25時間は25となる。
    /// 単位が0の場合は丸めずに単純な単位変換(切り捨て)を行う。
    ///
    /// 実行中のtime entryは呼び出し側で経過秒数に変換しておくこと。
    /// 負の値は0として扱う。
    ///
    /// # Examples
    ///
    /// ```
    /// let rounding = Rounding::new(15);
    /// assert_eq!(rounding.round(3661, RoundingFlavor::Ceil), 125);
    /// ```
    pub fn round(&self, seconds: i64, flavor: RoundingFlavor) -> i64 {
        let seconds = seconds.max(0);
        let increment = i64::from(self.increment_minutes);

        if increment == 0 {
            return seconds * 100 / SECONDS_PER_HOUR;
        }

        let increment_seconds = increment * 60;
        let units = match flavor {
            RoundingFlavor::Ceil => (seconds + increment_seconds - 1) / increment_seconds,
            RoundingFlavor::Floor => seconds / increment_seconds,
        };

        units * 100 * increment / 60
    }
}

/// `increment_minutes`単位で秒数を丸める。`Rounding::round`の省略形。
pub fn round_duration(seconds: i64, increment_minutes: u32, flavor: RoundingFlavor) -> i64 {
    Rounding::new(increment_minutes).round(seconds, flavor)
}

/// 時間の100倍の整数を表示用の文字列にする。
///
/// `hours_minutes`が有効な場合は`H:MM`形式、そうでない場合は小数点以下2桁の時間で表す。
pub fn format_duration(hours100: i64, hours_minutes: bool) -> String {
    if hours_minutes {
        let hours = hours100 / 100;
        let minutes = (hours100 % 100 * 60 + 50) / 100;
        format!("{}:{:02}", hours, minutes)
    } else {
        format!("{:.2}", hours100 as f64 / 100.0)
    }
}
