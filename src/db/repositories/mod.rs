mod events;
mod track_points;
