//! Source adapters: where raw records come from.
//!
//! Live HTTP and file adapters live in `roadsigns-feeds`; this module holds
//! the trait and the in-memory fixture used for mock mode and tests.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

use crate::error::FetchError;
use crate::model::{GeoPoint, SourceId, SourceRecord};

/// One registry feed. Called from a worker thread during a pass.
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> SourceId;

    fn fetch_records(&self) -> Result<Vec<SourceRecord>, FetchError>;
}

/// Serves a fixed, replaceable record set.
#[derive(Debug)]
pub struct FixtureAdapter {
    source: SourceId,
    response: Mutex<Result<Vec<SourceRecord>, FetchError>>,
    delay: Option<Duration>,
}

impl FixtureAdapter {
    pub fn new(source: SourceId, records: Vec<SourceRecord>) -> Self {
        Self {
            source,
            response: Mutex::new(Ok(records)),
            delay: None,
        }
    }

    /// The built-in demo dataset for `source`.
    pub fn mock(source: SourceId) -> Self {
        Self::new(source, mock_records(source))
    }

    /// Sleep before answering; for exercising timeouts and coalescing.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_records(&self, records: Vec<SourceRecord>) {
        *self.lock() = Ok(records);
    }

    pub fn fail_with(&self, error: FetchError) {
        *self.lock() = Err(error);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Result<Vec<SourceRecord>, FetchError>> {
        self.response.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SourceAdapter for FixtureAdapter {
    fn source(&self) -> SourceId {
        self.source
    }

    fn fetch_records(&self) -> Result<Vec<SourceRecord>, FetchError> {
        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        self.lock().clone()
    }
}

// ---------------------------------------------------------------------------
// Demo dataset
// ---------------------------------------------------------------------------

struct MockSign {
    name: &'static str,
    lat: f64,
    lon: f64,
    authority: Option<(&'static str, &'static str, (i32, u32, u32))>,
    commercial: Option<(&'static str, &'static str, (i32, u32, u32))>,
}

/// Commercial surveys sit a few metres off the authority position.
const COMMERCIAL_OFFSET_DEG: f64 = 0.00003;

const MOCK_SIGNS: &[MockSign] = &[
    MockSign {
        name: "Знак 'Главная дорога' на перекрестке ул. Ленина",
        lat: 55.751244,
        lon: 37.618423,
        authority: Some((
            "G12345",
            "Знак 2.1 'Главная дорога'. Установлен на перекрестке ул. Ленина и ул. Пушкина.",
            (2024, 3, 15),
        )),
        commercial: Some((
            "C67890",
            "Знак приоритета 2.1, металлический, светоотражающая пленка тип B, состояние хорошее.",
            (2024, 4, 1),
        )),
    },
    MockSign {
        name: "Знак 'Уступи дорогу' на ул. Гагарина",
        lat: 55.755814,
        lon: 37.617635,
        authority: Some((
            "G23456",
            "Знак 2.4 'Уступи дорогу'. Установлен на пересечении с ул. Советской.",
            (2024, 2, 10),
        )),
        commercial: None,
    },
    MockSign {
        name: "Знак 'Пешеходный переход' возле школы №5",
        lat: 55.753215,
        lon: 37.622504,
        authority: None,
        commercial: Some((
            "C78901",
            "Знак 5.19.1 'Пешеходный переход', двусторонний, на желтом фоне, требуется замена.",
            (2024, 3, 20),
        )),
    },
    MockSign {
        name: "Знак 'Остановка запрещена' на пр. Мира",
        lat: 55.761665,
        lon: 37.632324,
        authority: Some((
            "G34567",
            "Знак 3.27 'Остановка запрещена'. Действует по рабочим дням.",
            (2024, 1, 25),
        )),
        commercial: Some((
            "C89012",
            "Знак 3.27, односторонний, состояние удовлетворительное, требуется очистка.",
            (2024, 4, 5),
        )),
    },
    MockSign {
        name: "Знак 'Ограничение скорости 40' на ул. Строителей",
        lat: 55.758582,
        lon: 37.642455,
        authority: Some((
            "G45678",
            "Знак 3.24 'Ограничение максимальной скорости' 40 км/ч.",
            (2024, 3, 1),
        )),
        commercial: Some((
            "C90123",
            "Знак ограничения скорости до 40 км/ч, установлен на опоре освещения.",
            (2024, 3, 5),
        )),
    },
    MockSign {
        name: "Знак 'Движение без остановки запрещено' на ул. Космонавтов",
        lat: 55.764976,
        lon: 37.638575,
        authority: None,
        commercial: Some((
            "C01234",
            "Знак 2.5 'Движение без остановки запрещено', требуется замена.",
            (2024, 2, 15),
        )),
    },
    MockSign {
        name: "Знак 'Въезд запрещен' на ул. Парковой",
        lat: 55.769768,
        lon: 37.644772,
        authority: Some(("G56789", "Знак 3.1 'Въезд запрещен'. Кирпич.", (2023, 12, 10))),
        commercial: None,
    },
    MockSign {
        name: "Знак 'Парковка' у торгового центра",
        lat: 55.753559,
        lon: 37.609218,
        authority: Some((
            "G67890",
            "Знак 6.4 'Парковка (парковочное место)'.",
            (2024, 1, 15),
        )),
        commercial: Some((
            "C12345",
            "Знак 6.4 'Место стоянки', с дополнительной информацией о режиме работы.",
            (2024, 4, 10),
        )),
    },
    MockSign {
        name: "Знак 'Обгон запрещен' на Садовом кольце",
        lat: 55.757539,
        lon: 37.626904,
        authority: Some(("G78901", "Знак 3.20 'Обгон запрещен'.", (2024, 2, 20))),
        commercial: Some(("C23456", "Знак 3.20, состояние хорошее.", (2024, 2, 25))),
    },
    MockSign {
        name: "Знак 'Тупик' на ул. Заречной",
        lat: 55.748215,
        lon: 37.631294,
        authority: None,
        commercial: Some((
            "C34567",
            "Знак 6.8.1 'Тупик', требуется обновление.",
            (2024, 3, 15),
        )),
    },
];

fn day(ymd: (i32, u32, u32)) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(ymd.0, ymd.1, ymd.2, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Ten Moscow signs: seven reported by the authority, eight by the
/// commercial provider, five by both.
pub fn mock_records(source: SourceId) -> Vec<SourceRecord> {
    MOCK_SIGNS
        .iter()
        .filter_map(|sign| {
            let (side, position) = match source {
                SourceId::Authority => (sign.authority, GeoPoint::new(sign.lat, sign.lon)),
                SourceId::Commercial => (
                    sign.commercial,
                    GeoPoint::new(sign.lat + COMMERCIAL_OFFSET_DEG, sign.lon),
                ),
            };
            let (id, description, observed) = side?;
            Some(SourceRecord {
                source,
                external_id: Some(id.to_string()),
                name: sign.name.to_string(),
                position,
                description: Some(description.to_string()),
                observed_at: day(observed),
            })
        })
        .collect()
}
