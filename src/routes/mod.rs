pub mod bookings;
pub mod contact;
pub mod documents;
pub mod geo;
pub mod health;
pub mod images;
pub mod notifications;
pub mod profiles;
pub mod providers;
pub mod reviews;
pub mod services;
pub mod users;
