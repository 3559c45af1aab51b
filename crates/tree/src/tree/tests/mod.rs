mod expansion;
mod helpers;
mod removal;
