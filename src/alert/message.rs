//! SMS bodies for emergency and test messages

use chrono::{DateTime, Local, Utc};

use crate::location::ResolvedLocation;
use crate::store::EmergencyContact;

/// Message recorded with every alert
pub const EMERGENCY_MESSAGE: &str =
    "Emergency assistance needed. Audio message recorded. Please respond immediately.";

/// Google Maps link for a position
pub fn maps_link(latitude: f64, longitude: f64) -> String {
    format!("https://maps.google.com/?q={},{}", latitude, longitude)
}

/// Renders the emergency SMS sent to every contact
///
/// The time is shown in the device's local zone.
pub fn render_emergency_sms(
    message: &str,
    location: &ResolvedLocation,
    sent_at: DateTime<Utc>,
) -> String {
    let local = sent_at.with_timezone(&Local);
    format!(
        "🆘 EMERGENCY ALERT 🆘\n\
         \n\
         {message}\n\
         \n\
         📍 Location: {location}\n\
         \n\
         🗺️ Google Maps: {link}\n\
         \n\
         ⏰ Time: {time}\n\
         \n\
         This is an automated emergency message.",
        message = message,
        location = location.display_label(),
        link = maps_link(location.latitude, location.longitude),
        time = local.format("%Y-%m-%d %H:%M:%S"),
    )
}

/// Renders the test SMS sent to a single contact
pub fn render_test_sms(contact: &EmergencyContact, location: &ResolvedLocation) -> String {
    format!(
        "Hello {name},\n\
         \n\
         This is a TEST message from your emergency contact app.\n\
         \n\
         If you receive this, you are successfully configured as an emergency contact.\n\
         \n\
         📍 Test Location: {location}\n\
         \n\
         No action is needed. This is only a test.\n\
         \n\
         Emergency Contact System",
        name = contact.name,
        location = location.display_label(),
    )
}
