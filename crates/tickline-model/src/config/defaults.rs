use serde_json::json;

use crate::ConfigDocument;

/// Polling interval applied when the document carries none (seconds).
pub const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 5;

/// The document materialised when no readable configuration exists.
///
/// Key order is part of the persisted file, so keep it stable.
pub fn default_document() -> ConfigDocument {
    json!({
        "update_interval": DEFAULT_UPDATE_INTERVAL_SECS,
        "display_format": "{display_with_trend}",
        "time_format": "%H:%M:%S",
        "date_format": "%Y-%m-%d",
        "custom_info": {
            "enabled": false,
            "text": "自定义信息"
        },
        "system_info": {
            "show_time": true,
            "show_date": false,
            "show_battery": false,
            "show_cpu": false,
            "show_memory": false,
            "show_disk": false
        },
        "network_info": {
            "show_local_ip": false,
            "show_public_ip": false,
            "show_network_usage": false
        },
        "weather_info": {
            "enabled": false,
            "city": "beijing",
            "api_key": ""
        },
        "stock_info": {
            "enabled": true,
            "symbols": ["600519", "000001", "AAPL", "hk00700"],
            "primary_symbol": "600519",
            "show_multiple": false,
            "rotate_stocks": true,
            "rotate_interval": 10,
            "show_index": true,
            "index_code": "000001",
            "use_color_indicators": true,
            "show_trend_chart": true,
            "trend_period_hours": 3,
            "use_image_chart": true
        }
    })
}
