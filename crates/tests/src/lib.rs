pub mod fixtures;

#[cfg(test)]
mod attendance_tests;
#[cfg(test)]
mod meeting_tests;
#[cfg(test)]
mod webhook_tests;
